use super::{FieldMigrator, FieldNote};
use serde_json::{json, Map, Value};

/// Scalar `description` → `{ value: <string> }`.
#[derive(Debug)]
pub struct DescriptionMigrator;

impl FieldMigrator for DescriptionMigrator {
    fn field(&self) -> &'static str {
        "description"
    }

    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote> {
        let text = match system.get("description") {
            Some(Value::Object(obj)) if obj.get("value").is_some_and(Value::is_string) => {
                return None
            }
            Some(Value::Object(obj)) => scalar_text(obj.get("value")),
            other => scalar_text(other),
        };
        system.insert("description".to_string(), json!({ "value": text }));
        Some(FieldNote::info(
            "Structured description",
            json!({ "field": "description" }),
        ))
    }
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Legacy `ranks` (or a stringly `level`) → non-negative integer `level`.
#[derive(Debug)]
pub struct LevelMigrator;

impl FieldMigrator for LevelMigrator {
    fn field(&self) -> &'static str {
        "level"
    }

    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote> {
        let ranks = system.remove("ranks");
        let current = system.get("level");
        if ranks.is_none() && current.is_some_and(|v| v.as_u64().is_some()) {
            return None;
        }

        let source = current.cloned().or(ranks.clone()).unwrap_or(Value::Null);
        let level = super::coerce_non_negative(&source).trunc() as u64;
        system.insert("level".to_string(), json!(level));
        Some(FieldNote::info(
            "Normalized level",
            json!({ "from": source, "to": level, "legacyKey": ranks.map(|_| "ranks") }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_description_scalar_is_wrapped() {
        let mut system = map(json!({ "description": "<p>Hello</p>" }));
        assert!(DescriptionMigrator.migrate(&mut system).is_some());
        assert_eq!(system["description"], json!({ "value": "<p>Hello</p>" }));
        assert!(DescriptionMigrator.migrate(&mut system).is_none());
    }

    #[test]
    fn test_description_missing_or_odd() {
        let mut system = map(json!({}));
        DescriptionMigrator.migrate(&mut system);
        assert_eq!(system["description"], json!({ "value": "" }));

        let mut system = map(json!({ "description": { "value": 12 } }));
        DescriptionMigrator.migrate(&mut system);
        assert_eq!(system["description"], json!({ "value": "12" }));
    }

    #[test]
    fn test_level_from_ranks() {
        let mut system = map(json!({ "ranks": "3" }));
        assert!(LevelMigrator.migrate(&mut system).is_some());
        assert_eq!(system["level"], json!(3));
        assert!(!system.contains_key("ranks"));
        assert!(LevelMigrator.migrate(&mut system).is_none());
    }

    #[test]
    fn test_level_garbage_defaults_to_zero() {
        let mut system = map(json!({ "level": "-2" }));
        LevelMigrator.migrate(&mut system);
        assert_eq!(system["level"], json!(0));

        let mut system = map(json!({ "level": 2.7 }));
        LevelMigrator.migrate(&mut system);
        assert_eq!(system["level"], json!(2));
    }
}
