//! Untyped actor and item documents.
//!
//! A [`Document`] wraps the raw JSON object exactly as the host stores it.
//! The pipeline never deserializes into typed structs: legacy data is too
//! irregular, and every key it doesn't touch must round-trip unchanged.

use crate::config::MigrationConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which kind of host document this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Actor,
    Item,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Actor => "Actor",
            DocumentKind::Item => "Item",
        }
    }

    /// Store bucket holding top-level documents of this kind.
    pub fn bucket(&self) -> Bucket {
        match self {
            DocumentKind::Actor => Bucket::Actors,
            DocumentKind::Item => Bucket::Items,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse partition of stored documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Actors,
    Items,
    /// Type changes whose old and new type match neither vocabulary.
    Unknown,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Actors => "actors",
            Bucket::Items => "items",
            Bucket::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One actor or item as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    kind: DocumentKind,
    data: Map<String, Value>,
}

impl Document {
    /// Wrap a JSON value. Non-object values become an empty document.
    pub fn new(kind: DocumentKind, value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, data }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        self.str_field("_id").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.str_field("name").unwrap_or_default()
    }

    pub fn doc_type(&self) -> &str {
        self.str_field("type").unwrap_or_default()
    }

    pub fn set_type(&mut self, doc_type: impl Into<String>) {
        self.data
            .insert("type".to_string(), Value::String(doc_type.into()));
    }

    /// Human-readable label used in logs and handler errors.
    pub fn label(&self) -> String {
        format!("{}.{} ({})", self.kind, self.id(), self.name())
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn system(&self) -> Option<&Map<String, Value>> {
        self.data.get("system").and_then(Value::as_object)
    }

    /// Mutable `system` record, created (or replaced if not an object) on demand.
    pub fn system_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .data
            .entry("system".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("system slot was just made an object"),
        }
    }

    /// Read a string from `system`.
    pub fn system_str(&self, key: &str) -> Option<&str> {
        self.system()
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
    }

    pub fn flags(&self) -> Option<&Map<String, Value>> {
        self.data.get("flags").and_then(Value::as_object)
    }

    /// Our own namespace inside `flags`, if present.
    pub fn own_flags(&self) -> Option<&Map<String, Value>> {
        self.flags()
            .and_then(|f| f.get(MigrationConfig::FLAGS_NAMESPACE))
            .and_then(Value::as_object)
    }

    fn own_flags_mut(&mut self) -> &mut Map<String, Value> {
        let flags = self
            .data
            .entry("flags".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !flags.is_object() {
            *flags = Value::Object(Map::new());
        }
        let Value::Object(flags) = flags else {
            unreachable!("flags slot was just made an object")
        };
        let own = flags
            .entry(MigrationConfig::FLAGS_NAMESPACE.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !own.is_object() {
            *own = Value::Object(Map::new());
        }
        match own {
            Value::Object(map) => map,
            _ => unreachable!("namespace slot was just made an object"),
        }
    }

    /// Version stamp from `system.edVersion`, falling back to the flag.
    pub fn version_stamp(&self) -> Option<&str> {
        self.system_str(MigrationConfig::SYSTEM_VERSION).or_else(|| {
            self.own_flags()
                .and_then(|f| f.get(MigrationConfig::FLAG_MIGRATION_VERSION))
                .and_then(Value::as_str)
        })
    }

    /// Whether an old migration marked this document without a version.
    pub fn has_legacy_marker(&self) -> bool {
        let flagged = self
            .own_flags()
            .and_then(|f| f.get(MigrationConfig::FLAG_LEGACY_MIGRATED))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        flagged
            || self
                .system()
                .is_some_and(|s| s.contains_key(MigrationConfig::SYSTEM_MIGRATION_SOURCE))
    }

    /// Write the migration stamps. Other flags are left untouched.
    pub fn stamp(&mut self, source_system: &str, version: &str) {
        let system = self.system_mut();
        system.insert(
            MigrationConfig::SYSTEM_MIGRATION_SOURCE.to_string(),
            Value::String(source_system.to_string()),
        );
        system.insert(
            MigrationConfig::SYSTEM_VERSION.to_string(),
            Value::String(version.to_string()),
        );
        self.own_flags_mut().insert(
            MigrationConfig::FLAG_MIGRATION_VERSION.to_string(),
            Value::String(version.to_string()),
        );
    }

    /// Whether the payload still lives under the deprecated top-level key.
    pub fn has_legacy_container(&self) -> bool {
        self.data
            .get(MigrationConfig::LEGACY_PAYLOAD_KEY)
            .is_some_and(Value::is_object)
    }

    /// Move a legacy top-level payload under `system`.
    ///
    /// Keys already present in `system` win over the legacy payload.
    /// Returns `true` if anything moved.
    pub fn lift_legacy_container(&mut self) -> bool {
        let Some(Value::Object(legacy)) = self.data.remove(MigrationConfig::LEGACY_PAYLOAD_KEY)
        else {
            return false;
        };
        let system = self.system_mut();
        for (key, value) in legacy {
            system.entry(key).or_insert(value);
        }
        true
    }

    /// Remove and return embedded items. Non-object entries are dropped.
    pub fn take_embedded_items(&mut self) -> Vec<Document> {
        match self.data.remove("items") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter(Value::is_object)
                .map(|v| Document::new(DocumentKind::Item, v))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_embedded_items(&mut self, items: Vec<Document>) {
        let items = items.into_iter().map(Document::into_value).collect();
        self.data.insert("items".to_string(), Value::Array(items));
    }

    /// Embedded items without taking them.
    pub fn embedded_items(&self) -> Vec<Document> {
        self.data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|v| v.is_object())
                    .map(|v| Document::new(DocumentKind::Item, v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let doc = Document::new(
            DocumentKind::Item,
            json!({ "_id": "i1", "name": "Air Sailing", "type": "talent", "system": { "ranks": 2 } }),
        );
        assert_eq!(doc.id(), "i1");
        assert_eq!(doc.name(), "Air Sailing");
        assert_eq!(doc.doc_type(), "talent");
        assert_eq!(doc.system().unwrap()["ranks"], 2);
        assert_eq!(doc.label(), "Item.i1 (Air Sailing)");
    }

    #[test]
    fn test_stamp_preserves_other_flags() {
        let mut doc = Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a1", "flags": { "core": { "sheetClass": "x" }, "ed4e": { "fav": true } } }),
        );
        doc.stamp("earthdawn4e", "1.0.0");

        let flags = doc.flags().unwrap();
        assert_eq!(flags["core"]["sheetClass"], "x");
        assert_eq!(flags["ed4e"]["fav"], true);
        assert_eq!(flags["ed4e"]["migrationVersion"], "1.0.0");
        assert_eq!(doc.version_stamp(), Some("1.0.0"));
        assert_eq!(doc.system_str("migrationSource"), Some("earthdawn4e"));
    }

    #[test]
    fn test_lift_legacy_container() {
        let mut doc = Document::new(
            DocumentKind::Item,
            json!({ "_id": "i1", "data": { "weight": 2, "cost": "5" }, "system": { "weight": 3 } }),
        );
        assert!(doc.has_legacy_container());
        assert!(doc.lift_legacy_container());
        assert!(!doc.has_legacy_container());

        let system = doc.system().unwrap();
        assert_eq!(system["weight"], 3);
        assert_eq!(system["cost"], "5");
        assert!(!doc.lift_legacy_container());
    }

    #[test]
    fn test_system_mut_replaces_non_object() {
        let mut doc = Document::new(DocumentKind::Item, json!({ "system": "broken" }));
        doc.system_mut().insert("level".into(), json!(1));
        assert_eq!(doc.system().unwrap()["level"], 1);
    }

    #[test]
    fn test_embedded_items_round_trip() {
        let mut actor = Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a1", "items": [ { "_id": "i1" }, 7, { "_id": "i2" } ] }),
        );
        let items = actor.take_embedded_items();
        assert_eq!(items.len(), 2);
        assert!(actor.embedded_items().is_empty());

        actor.set_embedded_items(items);
        let ids: Vec<_> = actor.embedded_items().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
    }

    #[test]
    fn test_legacy_marker() {
        let flagged = Document::new(
            DocumentKind::Item,
            json!({ "flags": { "ed4e": { "migrated": true } } }),
        );
        assert!(flagged.has_legacy_marker());

        let sourced = Document::new(
            DocumentKind::Item,
            json!({ "system": { "migrationSource": "earthdawn4e" } }),
        );
        assert!(sourced.has_legacy_marker());
        assert_eq!(sourced.version_stamp(), None);
    }
}
