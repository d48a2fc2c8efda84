//! Closed-vocabulary string fields.

use super::{FieldMigrator, FieldNote};
use crate::naming::normalize_type_key;
use serde_json::{json, Map, Value};

/// Canonical attribute abbreviations.
pub const ATTRIBUTES: [&str; 6] = ["dex", "str", "tou", "per", "wil", "cha"];

fn canonical_attribute(raw: &str) -> Option<&'static str> {
    let key = normalize_type_key(raw);
    let key = key.trim_end_matches("step").trim_end_matches("value");
    let found = match key {
        "dex" | "dexterity" => "dex",
        "str" | "strength" => "str",
        "tou" | "toughness" => "tou",
        "per" | "perception" => "per",
        "wil" | "willpower" => "wil",
        "cha" | "charisma" => "cha",
        _ => return None,
    };
    Some(found)
}

/// `attribute` → one of [`ATTRIBUTES`], or `""` when unrecognizable.
#[derive(Debug)]
pub struct AttributeMigrator;

impl FieldMigrator for AttributeMigrator {
    fn field(&self) -> &'static str {
        "attribute"
    }

    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote> {
        let raw = match system.get("attribute") {
            Some(Value::String(s)) => s.clone(),
            None => return None,
            Some(other) => other.to_string(),
        };
        if raw.is_empty() || ATTRIBUTES.contains(&raw.as_str()) {
            return None;
        }

        match canonical_attribute(&raw) {
            Some(abbr) => {
                system.insert("attribute".to_string(), json!(abbr));
                Some(FieldNote::info(
                    "Normalized attribute",
                    json!({ "from": raw, "to": abbr }),
                ))
            }
            None => {
                system.insert("attribute".to_string(), json!(""));
                Some(FieldNote::warning(
                    format!("Unrecognized attribute '{raw}', cleared"),
                    json!({ "from": raw }),
                ))
            }
        }
    }
}

/// Canonical action types.
pub const ACTIONS: [&str; 5] = ["standard", "simple", "free", "sustained", "na"];

/// `action` → one of [`ACTIONS`]; unknown values become `standard`.
#[derive(Debug)]
pub struct ActionMigrator;

impl FieldMigrator for ActionMigrator {
    fn field(&self) -> &'static str {
        "action"
    }

    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote> {
        let raw = match system.get("action") {
            Some(Value::String(s)) => s.clone(),
            None => return None,
            Some(other) => other.to_string(),
        };
        if ACTIONS.contains(&raw.as_str()) {
            return None;
        }

        let key = normalize_type_key(&raw).replace(['-', '/', '.'], "");
        let canonical = match key.as_str() {
            "standard" | "std" => Some("standard"),
            "simple" => Some("simple"),
            "free" => Some("free"),
            "sustained" => Some("sustained"),
            "na" | "none" | "" => Some("na"),
            _ => None,
        };

        match canonical {
            Some(action) => {
                system.insert("action".to_string(), json!(action));
                Some(FieldNote::info(
                    "Normalized action",
                    json!({ "from": raw, "to": action }),
                ))
            }
            None => {
                system.insert("action".to_string(), json!("standard"));
                Some(FieldNote::warning(
                    format!("Unrecognized action '{raw}', defaulted to standard"),
                    json!({ "from": raw, "to": "standard" }),
                ))
            }
        }
    }
}
