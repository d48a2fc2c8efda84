//! Post-batch repair of references broken by type changes.
//!
//! Complex type transforms change a document's type after other documents
//! may already reference it as `{ id, type }`. Fix-up passes run once per
//! batch, after every document has been migrated, with the ids recorded by
//! the tracker.

use crate::document::{Document, DocumentKind};
use crate::ledger::{IssueLedger, Severity, Subject};
use crate::tracker::TransformedDocuments;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// A repair pass over the migrated batch.
pub trait FixupPass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Repair `batch` in place. Returns the number of references changed.
    fn apply(
        &self,
        transformed: &TransformedDocuments,
        batch: &mut [Document],
        ledger: &mut IssueLedger,
    ) -> usize;
}

/// Rewrites `{ id, type }` references that still carry a tracked
/// document's old type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypedReferenceFixup;

impl TypedReferenceFixup {
    /// Current type of every tracked id found in the batch, embedded items included.
    fn current_types(transformed: &TransformedDocuments, batch: &[Document]) -> HashMap<String, String> {
        let mut types = HashMap::new();
        for document in batch {
            if transformed.contains(document.id()) {
                types.insert(document.id().to_string(), document.doc_type().to_string());
            }
            for item in document.embedded_items() {
                if transformed.contains(item.id()) {
                    types.insert(item.id().to_string(), item.doc_type().to_string());
                }
            }
        }
        types
    }
}

fn rewrite(value: &mut Value, types: &HashMap<String, String>, changed: &mut Vec<(String, String, String)>) {
    match value {
        Value::Object(map) => {
            let id = map.get("id").and_then(Value::as_str).map(str::to_string);
            let old = map.get("type").and_then(Value::as_str).map(str::to_string);
            if let (Some(id), Some(old)) = (id, old) {
                if let Some(new) = types.get(&id).filter(|new| **new != old) {
                    map.insert("type".to_string(), json!(new));
                    changed.push((id, old, new.clone()));
                }
            }
            for child in map.values_mut() {
                rewrite(child, types, changed);
            }
        }
        Value::Array(items) => {
            for child in items {
                rewrite(child, types, changed);
            }
        }
        _ => {}
    }
}

fn rewrite_system(document: &mut Document, types: &HashMap<String, String>) -> Vec<(String, String, String)> {
    let mut changed = Vec::new();
    if let Some(system) = document.as_map_mut().get_mut("system") {
        rewrite(system, types, &mut changed);
    }
    changed
}

/// Rewrite references inside an actor's embedded items, in place.
///
/// Only entries with a changed reference are written back; the `items`
/// array is left alone otherwise, non-object entries included.
fn rewrite_embedded(
    document: &mut Document,
    types: &HashMap<String, String>,
) -> Vec<(Document, Vec<(String, String, String)>)> {
    let mut rewritten = Vec::new();
    let Some(Value::Array(items)) = document.as_map_mut().get_mut("items") else {
        return rewritten;
    };
    for entry in items.iter_mut().filter(|e| e.is_object()) {
        let mut item = Document::new(DocumentKind::Item, entry.clone());
        let changed = rewrite_system(&mut item, types);
        if !changed.is_empty() {
            *entry = item.clone().into_value();
            rewritten.push((item, changed));
        }
    }
    rewritten
}

fn record(ledger: &mut IssueLedger, subject: Subject, changed: Vec<(String, String, String)>) {
    for (id, old, new) in changed {
        ledger.record(
            Severity::Info,
            subject.clone(),
            format!("Updated reference to {id} from '{old}' to '{new}'"),
            json!({ "id": id, "from": old, "to": new }),
        );
    }
}

impl FixupPass for TypedReferenceFixup {
    fn name(&self) -> &'static str {
        "typed-reference"
    }

    fn apply(
        &self,
        transformed: &TransformedDocuments,
        batch: &mut [Document],
        ledger: &mut IssueLedger,
    ) -> usize {
        if transformed.is_empty() {
            return 0;
        }
        let types = Self::current_types(transformed, batch);
        if types.is_empty() {
            return 0;
        }

        let mut total = 0;
        for document in batch.iter_mut() {
            if document.kind() == DocumentKind::Actor {
                for (item, changed) in rewrite_embedded(document, &types) {
                    total += changed.len();
                    record(ledger, Subject::embedded_in(&item, document), changed);
                }
            }

            let changed = rewrite_system(document, &types);
            total += changed.len();
            record(ledger, Subject::of(document), changed);
        }
        debug!("Typed reference fix-up rewrote {} references", total);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Bucket;

    #[test]
    fn test_rewrites_stale_typed_reference() {
        let mut tracker = TransformedDocuments::new();
        tracker.add(Bucket::Items, "k1");

        let mut batch = vec![
            Document::new(
                DocumentKind::Item,
                json!({ "_id": "k1", "name": "Riposte", "type": "knackManeuver", "system": {} }),
            ),
            Document::new(
                DocumentKind::Item,
                json!({ "_id": "t1", "name": "Melee Weapons", "type": "talent",
                        "system": { "knacks": [ { "id": "k1", "type": "knack" }, { "id": "x", "type": "knack" } ] } }),
            ),
        ];
        let mut ledger = IssueLedger::new();

        let changed = TypedReferenceFixup.apply(&tracker, &mut batch, &mut ledger);
        assert_eq!(changed, 1);
        let knacks = &batch[1].system().unwrap()["knacks"];
        assert_eq!(knacks[0]["type"], "knackManeuver");
        assert_eq!(knacks[1]["type"], "knack");
        assert_eq!(ledger.issues()[0].subject.id, "t1");

        assert_eq!(TypedReferenceFixup.apply(&tracker, &mut batch, &mut ledger), 0);
    }

    #[test]
    fn test_embedded_references_are_rewritten() {
        let mut tracker = TransformedDocuments::new();
        tracker.add(Bucket::Items, "k1");

        let mut batch = vec![Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a1", "name": "Ardan", "type": "npc", "system": {}, "items": [
                { "_id": "k1", "name": "Riposte", "type": "knackAbility", "system": {} },
                { "_id": "t1", "name": "Melee", "type": "talent", "system": { "favorite": { "id": "k1", "type": "knack" } } },
            ] }),
        )];
        let mut ledger = IssueLedger::new();

        assert_eq!(TypedReferenceFixup.apply(&tracker, &mut batch, &mut ledger), 1);
        let items = batch[0].embedded_items();
        assert_eq!(items[1].system().unwrap()["favorite"]["type"], "knackAbility");
        assert_eq!(
            ledger.issues()[0].subject.owner,
            Some(("a1".to_string(), "Ardan".to_string()))
        );
    }

    #[test]
    fn test_untouched_actors_keep_their_layout() {
        let mut tracker = TransformedDocuments::new();
        tracker.add(Bucket::Items, "k1");

        let knack = Document::new(
            DocumentKind::Item,
            json!({ "_id": "k1", "name": "Riposte", "type": "knackKarma", "system": {} }),
        );
        let bare = Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a1", "name": "Ardan", "type": "npc", "system": { "edVersion": "1.0.0" } }),
        );
        let odd_items = Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a2", "name": "Kira", "type": "character", "system": {}, "items": [
                "stray",
                { "_id": "t1", "name": "Melee", "type": "talent", "system": {} },
            ] }),
        );
        let mut batch = vec![knack, bare.clone(), odd_items.clone()];
        let mut ledger = IssueLedger::new();

        assert_eq!(TypedReferenceFixup.apply(&tracker, &mut batch, &mut ledger), 0);
        assert_eq!(batch[1], bare);
        assert!(!batch[1].as_map().contains_key("items"));
        assert_eq!(batch[2], odd_items);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_nothing_tracked_is_noop() {
        let mut batch = vec![Document::new(DocumentKind::Item, json!({ "_id": "i" }))];
        let mut ledger = IssueLedger::new();
        assert_eq!(
            TypedReferenceFixup.apply(&TransformedDocuments::new(), &mut batch, &mut ledger),
            0
        );
        assert!(ledger.is_empty());
    }
}
