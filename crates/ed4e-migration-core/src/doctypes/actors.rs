use super::items::relocate_integer;
use crate::document::Document;
use crate::fields::ATTRIBUTES;
use crate::registry::MigrationContext;
use serde_json::{json, Map, Value};

/// Flat legacy attribute keys, in the order of [`ATTRIBUTES`].
const LEGACY_ATTRIBUTE_KEYS: [&str; 6] = [
    "dexterityvalue",
    "strengthvalue",
    "toughnessvalue",
    "perceptionvalue",
    "willpowervalue",
    "charismavalue",
];

/// Rules shared by every actor type.
pub(super) fn migrate_common(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();

    let mut attributes = Map::new();
    for (legacy, abbr) in LEGACY_ATTRIBUTE_KEYS.iter().zip(ATTRIBUTES) {
        if let Some((_, value)) = relocate_integer(system, legacy, &["attributes", abbr, "value"]) {
            attributes.insert(abbr.to_string(), value);
        }
    }
    if !attributes.is_empty() {
        ctx.issues()
            .info("Restructured attributes", Value::Object(attributes));
    }

    let mut karma = Map::new();
    for (legacy, child) in [("karmamax", "max"), ("karmavalue", "value")] {
        if let Some((_, value)) = relocate_integer(system, legacy, &["karma", child]) {
            karma.insert(child.to_string(), value);
        }
    }
    if !karma.is_empty() {
        ctx.issues().info("Restructured karma", Value::Object(karma));
    }
}

pub(super) fn migrate_character(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    let mut moved = Map::new();
    for (legacy, child) in [("legendpointtotal", "total"), ("legendpointcurrent", "current")] {
        if let Some((_, value)) = relocate_integer(system, legacy, &["legendPoints", child]) {
            moved.insert(child.to_string(), value);
        }
    }
    if !moved.is_empty() {
        ctx.issues()
            .info("Restructured legend points", Value::Object(moved));
    }
}

/// Npcs, creatures, spirits, horrors and dragons.
pub(super) fn migrate_creature_like(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let doc_type = document.doc_type().to_string();
    let system = document.system_mut();
    if let Some(discriminator) = system.remove("actorType") {
        ctx.issues().info(
            "Dropped legacy actor discriminator",
            json!({ "actorType": discriminator, "type": doc_type }),
        );
    }
    if let Some((from, to)) = relocate_integer(system, "challengerating", &["challenge", "rate"]) {
        ctx.issues()
            .info("Moved challenge rating", json!({ "from": from, "to": to }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SourceSystem;
    use crate::document::DocumentKind;
    use crate::ledger::{IssueLedger, Subject};

    fn actor(doc_type: &str, system: Value) -> Document {
        Document::new(
            DocumentKind::Actor,
            json!({ "_id": "a", "name": "Kira", "type": doc_type, "system": system }),
        )
    }

    fn with_ctx(doc: &mut Document, f: impl FnOnce(&mut Document, &mut MigrationContext<'_>)) -> IssueLedger {
        let mut ledger = IssueLedger::new();
        let source = SourceSystem::new("earthdawn4e");
        {
            let mut ctx = MigrationContext::new(&source, None, ledger.sink(Subject::of(doc)));
            f(doc, &mut ctx);
        }
        ledger
    }

    #[test]
    fn test_flat_attributes_and_karma_are_nested() {
        let mut doc = actor(
            "character",
            json!({ "dexterityvalue": "14", "willpowervalue": 11, "karmamax": 20, "karmavalue": "7" }),
        );
        let ledger = with_ctx(&mut doc, migrate_common);
        let system = doc.system().unwrap();
        assert_eq!(system["attributes"]["dex"]["value"], 14);
        assert_eq!(system["attributes"]["wil"]["value"], 11);
        assert_eq!(system["karma"], json!({ "max": 20, "value": 7 }));
        assert!(!system.contains_key("dexterityvalue"));
        assert_eq!(ledger.len(), 2);

        let ledger = with_ctx(&mut doc, migrate_common);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_existing_nested_value_wins() {
        let mut doc = actor(
            "npc",
            json!({ "strengthvalue": 3, "attributes": { "str": { "value": 9 } } }),
        );
        with_ctx(&mut doc, migrate_common);
        let system = doc.system().unwrap();
        assert_eq!(system["attributes"]["str"]["value"], 9);
        assert!(!system.contains_key("strengthvalue"));
    }

    #[test]
    fn test_creature_drops_discriminator() {
        let mut doc = actor("horror", json!({ "actorType": "horror construct", "challengerating": 4 }));
        with_ctx(&mut doc, migrate_creature_like);
        let system = doc.system().unwrap();
        assert!(!system.contains_key("actorType"));
        assert_eq!(system["challenge"]["rate"], 4);
    }

    #[test]
    fn test_character_legend_points() {
        let mut doc = actor("character", json!({ "legendpointtotal": "1200" }));
        with_ctx(&mut doc, migrate_character);
        assert_eq!(doc.system().unwrap()["legendPoints"]["total"], 1200);
    }
}
