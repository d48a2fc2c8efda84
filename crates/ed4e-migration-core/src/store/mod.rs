//! Host document storage.
//!
//! The pipeline only needs three operations from the host: list a bucket,
//! fetch one document, and write one batched update per top-level document.
//! [`JsonWorldStore`] implements them over a directory of JSON files.

mod atomic;
mod json_world;

pub use atomic::{atomic_read_json, atomic_write_json, backup_path};
pub use json_world::JsonWorldStore;

use crate::document::{Bucket, Document, DocumentKind};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One write against a stored document.
///
/// `system` replaces the stored record wholesale, `doc_type` replaces the
/// type, and `flags` is merged one namespace deep. Embedded changes ride
/// along so that a parent and all its items are written at once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentUpdate {
    pub id: String,
    pub doc_type: Option<String>,
    pub system: Option<Map<String, Value>>,
    pub flags: Option<Map<String, Value>>,
    pub embedded_upserts: Vec<Document>,
    pub embedded_deletions: Vec<String>,
}

impl DocumentUpdate {
    /// Update carrying a migrated document's type, system and flags.
    ///
    /// For actors, embedded items are upserted from the document as well.
    pub fn from_document(document: &Document) -> Self {
        let embedded_upserts = match document.kind() {
            DocumentKind::Actor => document.embedded_items(),
            DocumentKind::Item => Vec::new(),
        };
        Self {
            id: document.id().to_string(),
            doc_type: Some(document.doc_type().to_string()),
            system: Some(document.system().cloned().unwrap_or_default()),
            flags: document.flags().cloned(),
            embedded_upserts,
            embedded_deletions: Vec::new(),
        }
    }

    pub fn with_deletions(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.embedded_deletions.extend(ids);
        self
    }

    /// Apply this update to a raw stored document.
    pub fn apply_to(&self, target: &mut Map<String, Value>) {
        if let Some(doc_type) = &self.doc_type {
            target.insert("type".to_string(), Value::String(doc_type.clone()));
        }
        if let Some(system) = &self.system {
            target.insert("system".to_string(), Value::Object(system.clone()));
        }
        if let Some(flags) = &self.flags {
            merge_flags(target, flags);
        }
        // The deprecated payload container is gone once `system` is written.
        if self.system.is_some() {
            target.remove(crate::config::MigrationConfig::LEGACY_PAYLOAD_KEY);
        }

        if self.embedded_upserts.is_empty() && self.embedded_deletions.is_empty() {
            return;
        }
        let mut items: Vec<Value> = match target.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        items.retain(|item| {
            let id = item.get("_id").and_then(Value::as_str).unwrap_or_default();
            !self.embedded_deletions.iter().any(|d| d == id)
        });
        for upsert in &self.embedded_upserts {
            let position = items
                .iter()
                .position(|item| item.get("_id").and_then(Value::as_str) == Some(upsert.id()));
            let update = DocumentUpdate::from_document(upsert);
            match position.and_then(|i| items.get_mut(i)).and_then(Value::as_object_mut) {
                Some(existing) => update.apply_to(existing),
                None => items.push(upsert.clone().into_value()),
            }
        }
        target.insert("items".to_string(), Value::Array(items));
    }
}

fn merge_flags(target: &mut Map<String, Value>, flags: &Map<String, Value>) {
    let slot = target
        .entry("flags".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    let Value::Object(stored) = slot else {
        return;
    };
    for (namespace, value) in flags {
        match (stored.get_mut(namespace), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (key, v) in incoming {
                    existing.insert(key.clone(), v.clone());
                }
            }
            _ => {
                stored.insert(namespace.clone(), value.clone());
            }
        }
    }
}

/// Host storage for actors and items.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every top-level document in a bucket.
    async fn load_all(&self, bucket: Bucket) -> Result<Vec<Document>>;

    /// One top-level document, or `None` if it doesn't exist.
    async fn get(&self, bucket: Bucket, id: &str) -> Result<Option<Document>>;

    /// Persist one batched update.
    async fn write(&self, bucket: Bucket, update: DocumentUpdate) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_overwrites_system_and_merges_flags() {
        let mut stored = map(json!({
            "_id": "a1",
            "type": "creature",
            "data": { "karmamax": 3 },
            "system": { "old": true },
            "flags": { "core": { "sheet": "x" }, "ed4e": { "migrated": true } },
        }));
        let update = DocumentUpdate {
            id: "a1".into(),
            doc_type: Some("npc".into()),
            system: Some(map(json!({ "karma": { "max": 3 } }))),
            flags: Some(map(json!({ "ed4e": { "migrationVersion": "1.0.0" } }))),
            ..Default::default()
        };

        update.apply_to(&mut stored);
        assert_eq!(stored["type"], "npc");
        assert_eq!(stored["system"], json!({ "karma": { "max": 3 } }));
        assert_eq!(stored["flags"]["core"], json!({ "sheet": "x" }));
        assert_eq!(
            stored["flags"]["ed4e"],
            json!({ "migrated": true, "migrationVersion": "1.0.0" })
        );
        assert!(!stored.contains_key("data"));
    }

    #[test]
    fn test_embedded_upserts_and_deletions() {
        let mut stored = map(json!({
            "_id": "a1",
            "items": [
                { "_id": "t1", "type": "talent", "name": "Melee Weapons", "sort": 100 },
                { "_id": "k1", "type": "knack", "name": "Orphan" },
            ],
        }));
        let talent = Document::new(
            DocumentKind::Item,
            json!({ "_id": "t1", "type": "talent", "name": "Melee Weapons", "system": { "edid": "melee-weapons" } }),
        );
        let update = DocumentUpdate {
            id: "a1".into(),
            embedded_upserts: vec![talent],
            ..Default::default()
        }
        .with_deletions(["k1".to_string()]);

        update.apply_to(&mut stored);
        let items = stored["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["system"]["edid"], "melee-weapons");
        assert_eq!(items[0]["sort"], 100);
    }
}
