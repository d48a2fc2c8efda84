//! The original `earthdawn4e` data layout.
//!
//! Knacks used a single `knack` type with a `knackType` discriminator, and
//! every non-player actor was a `creature` with an `actorType` discriminator.
//! Attributes, karma and armor values were flat numeric keys.

use crate::detect::{SourceSystem, StructuralSignature};
use crate::doctypes;
use crate::document::{Document, DocumentKind};
use crate::naming::fold;
use crate::registry::{HandlerOutcome, LegacySystemSupport, MigrationContext, MigrationRegistry};
use crate::Result;
use serde_json::json;

pub const SOURCE_SYSTEM_ID: &str = "earthdawn4e";

/// Fields only this layout ever wrote into an actor's `system`.
const ACTOR_SIGNATURE: &[&str] = &[
    "dexterityvalue",
    "strengthvalue",
    "toughnessvalue",
    "perceptionvalue",
    "willpowervalue",
    "charismavalue",
    "karmamax",
    "legendpointtotal",
    "actorType",
];

/// Fields only this layout ever wrote into an item's `system`.
const ITEM_SIGNATURE: &[&str] = &[
    "ranks",
    "sourceTalentName",
    "knackType",
    "damagestep",
    "physicalarmor",
    "mysticarmor",
    "shatterthreshold",
    "artisan",
];

/// One-to-one type renames. Source types are matched case- and
/// diacritic-insensitively, so `Équipement` hits `equipement`.
const SIMPLE_TYPE_RULES: &[(&str, &str)] = &[
    // actors
    ("pc", "character"),
    ("character", "character"),
    ("npc", "npc"),
    // items
    ("talent", "talent"),
    ("skill", "skill"),
    ("devotion", "devotion"),
    ("spell", "spell"),
    ("weapon", "weapon"),
    ("armor", "armor"),
    ("shield", "shield"),
    ("equipment", "equipment"),
    ("equipement", "equipment"),
    ("namegiver", "namegiver"),
    ("race", "namegiver"),
    ("discipline", "discipline"),
    ("attack", "power"),
    ("spellmatrix", "matrix"),
    ("thread", "thread"),
    ("mask", "mask"),
];

/// Current knack type for a legacy `knackType` discriminator.
///
/// Missing or unrecognized discriminators default to `knackAbility`.
pub fn knack_type(discriminator: Option<&str>) -> &'static str {
    match discriminator.map(|d| fold(d.trim())).as_deref() {
        Some("karma") => "knackKarma",
        Some("maneuver") | Some("manoeuvre") => "knackManeuver",
        Some("spell") => "spellKnack",
        _ => "knackAbility",
    }
}

/// Current actor type for a legacy `actorType` discriminator.
///
/// Missing or unrecognized discriminators default to `creature`.
pub fn creature_type(discriminator: Option<&str>) -> &'static str {
    match discriminator.map(|d| fold(d.trim())).as_deref() {
        Some("npc") => "npc",
        Some("spirit") => "spirit",
        Some("horror") | Some("horror construct") => "horror",
        Some("dragon") => "dragon",
        _ => "creature",
    }
}

/// Complex type rule: resolve the generic legacy types by discriminator.
pub fn resolve_type(document: &Document) -> Option<String> {
    let resolved = match (document.kind(), document.doc_type()) {
        (DocumentKind::Item, "knack") => knack_type(document.system_str("knackType")),
        (DocumentKind::Actor, "creature") => creature_type(document.system_str("actorType")),
        _ => return None,
    };
    Some(resolved.to_string())
}

fn migrate_item(document: &mut Document, ctx: &mut MigrationContext<'_>) -> Result<HandlerOutcome> {
    if let Some(discriminator) = document.system_mut().remove("knackType") {
        ctx.issues().info(
            "Dropped legacy knack discriminator",
            json!({ "knackType": discriminator }),
        );
    }
    Ok(doctypes::migrate(document, ctx))
}

fn migrate_actor(document: &mut Document, ctx: &mut MigrationContext<'_>) -> Result<HandlerOutcome> {
    Ok(doctypes::migrate(document, ctx))
}

/// Support for the `earthdawn4e` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Earthdawn4e;

impl LegacySystemSupport for Earthdawn4e {
    fn id(&self) -> SourceSystem {
        SourceSystem::new(SOURCE_SYSTEM_ID)
    }

    fn signatures(&self) -> Vec<StructuralSignature> {
        vec![
            StructuralSignature::new(self.id(), DocumentKind::Actor, ACTOR_SIGNATURE),
            StructuralSignature::new(self.id(), DocumentKind::Item, ITEM_SIGNATURE),
        ]
    }

    fn register(&self, registry: &mut MigrationRegistry) -> Result<()> {
        for (source, target) in SIMPLE_TYPE_RULES {
            registry.register_type_transform(self.id(), source, target)?;
        }
        registry.register_complex_type_transform(self.id(), resolve_type)?;
        registry.register_migration(self.id(), DocumentKind::Item, migrate_item)?;
        registry.register_migration(self.id(), DocumentKind::Actor, migrate_actor)?;
        Ok(())
    }
}
