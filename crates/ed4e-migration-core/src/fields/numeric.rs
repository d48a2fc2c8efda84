//! Numeric fields that the current schema stores as `{ value }`.

use super::{FieldMigrator, FieldNote};
use serde_json::{json, Map, Number, Value};

/// Coerce a legacy scalar to a finite, non-negative number.
///
/// Accepts numbers and numeric strings using either `.` or `,` as the decimal
/// separator. Anything else, and any negative or non-finite result, is `0`.
pub fn coerce_non_negative(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_localized(s),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() && n >= 0.0 => n,
        _ => 0.0,
    }
}

fn parse_localized(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') && trimmed.contains('.') {
        // "1.234,5": dots group thousands, the comma is the decimal point
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.replace(',', ".")
    };
    normalized.parse::<f64>().ok()
}

fn is_canonical_number(value: &Value) -> bool {
    value
        .as_f64()
        .is_some_and(|n| n.is_finite() && n >= 0.0)
}

fn number(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or_else(|| json!(0))
}

/// Normalizer for a `{ value }` numeric field with optional legacy aliases.
#[derive(Debug)]
pub struct NumericFieldMigrator {
    field: &'static str,
    legacy_aliases: &'static [&'static str],
}

impl NumericFieldMigrator {
    pub const fn new(field: &'static str, legacy_aliases: &'static [&'static str]) -> Self {
        Self {
            field,
            legacy_aliases,
        }
    }

    /// Pull the first legacy alias into the canonical key when it's missing.
    /// Aliases are always removed; returns the first one that was present.
    fn absorb_aliases(&self, system: &mut Map<String, Value>) -> Option<&'static str> {
        let mut removed = None;
        for alias in self.legacy_aliases {
            if let Some(value) = system.remove(*alias) {
                if !system.contains_key(self.field) {
                    system.insert(self.field.to_string(), value);
                }
                removed.get_or_insert(*alias);
            }
        }
        removed
    }
}

impl FieldMigrator for NumericFieldMigrator {
    fn field(&self) -> &'static str {
        self.field
    }

    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote> {
        let alias = self.absorb_aliases(system);

        let original = system.get(self.field).cloned();
        let canonical = match &original {
            Some(Value::Object(obj)) => {
                let inner = obj.get("value").cloned().unwrap_or(Value::Null);
                if is_canonical_number(&inner) {
                    if alias.is_none() {
                        return None;
                    }
                    Value::Object(obj.clone())
                } else {
                    let mut obj = obj.clone();
                    obj.insert("value".to_string(), number(coerce_non_negative(&inner)));
                    Value::Object(obj)
                }
            }
            Some(scalar) => json!({ "value": number(coerce_non_negative(scalar)) }),
            None => json!({ "value": number(0.0) }),
        };

        system.insert(self.field.to_string(), canonical.clone());
        Some(FieldNote::info(
            format!("Normalized {}", self.field),
            json!({
                "field": self.field,
                "from": original.unwrap_or(Value::Null),
                "to": canonical,
                "legacyKey": alias,
            }),
        ))
    }
}
