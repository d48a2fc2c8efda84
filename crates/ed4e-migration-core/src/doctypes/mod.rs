//! Document-type migrators: business rules per current document type.
//!
//! Dispatch is an exhaustive match over [`CurrentType`]. Type strings that
//! don't parse take the explicit unhandled branch, which still records an
//! `info` issue so the report shows the document was seen.

mod abilities;
mod actors;
mod items;

pub use abilities::{LEGACY_PARENT_NAME_KEY, PARENT_EDID_KEY, PARENT_REF_KEY};

use crate::document::{Document, DocumentKind};
use crate::fields::{self, FieldMigrator};
use crate::registry::{HandlerOutcome, MigrationContext};
use serde_json::json;
use std::fmt;

/// Actor type strings, legacy and current, used to bucket type changes.
pub const ACTOR_TYPE_VOCABULARY: &[&str] = &[
    "character", "npc", "creature", "spirit", "horror", "dragon", "group", "pc",
];

/// Item type strings, legacy and current, used to bucket type changes.
pub const ITEM_TYPE_VOCABULARY: &[&str] = &[
    "talent",
    "skill",
    "devotion",
    "knack",
    "knackAbility",
    "knackKarma",
    "knackManeuver",
    "spellKnack",
    "spell",
    "weapon",
    "armor",
    "shield",
    "equipment",
    "namegiver",
    "race",
    "discipline",
    "attack",
    "power",
    "spellmatrix",
    "matrix",
    "thread",
    "mask",
];

/// Current document types that have business rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrentType {
    // Items
    Talent,
    Skill,
    Devotion,
    KnackAbility,
    KnackKarma,
    KnackManeuver,
    SpellKnack,
    Spell,
    Weapon,
    Armor,
    Shield,
    Equipment,
    Namegiver,
    Discipline,
    // Actors
    Character,
    Npc,
    Creature,
    Spirit,
    Horror,
    Dragon,
}

impl CurrentType {
    pub const ALL: [CurrentType; 20] = [
        CurrentType::Talent,
        CurrentType::Skill,
        CurrentType::Devotion,
        CurrentType::KnackAbility,
        CurrentType::KnackKarma,
        CurrentType::KnackManeuver,
        CurrentType::SpellKnack,
        CurrentType::Spell,
        CurrentType::Weapon,
        CurrentType::Armor,
        CurrentType::Shield,
        CurrentType::Equipment,
        CurrentType::Namegiver,
        CurrentType::Discipline,
        CurrentType::Character,
        CurrentType::Npc,
        CurrentType::Creature,
        CurrentType::Spirit,
        CurrentType::Horror,
        CurrentType::Dragon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentType::Talent => "talent",
            CurrentType::Skill => "skill",
            CurrentType::Devotion => "devotion",
            CurrentType::KnackAbility => "knackAbility",
            CurrentType::KnackKarma => "knackKarma",
            CurrentType::KnackManeuver => "knackManeuver",
            CurrentType::SpellKnack => "spellKnack",
            CurrentType::Spell => "spell",
            CurrentType::Weapon => "weapon",
            CurrentType::Armor => "armor",
            CurrentType::Shield => "shield",
            CurrentType::Equipment => "equipment",
            CurrentType::Namegiver => "namegiver",
            CurrentType::Discipline => "discipline",
            CurrentType::Character => "character",
            CurrentType::Npc => "npc",
            CurrentType::Creature => "creature",
            CurrentType::Spirit => "spirit",
            CurrentType::Horror => "horror",
            CurrentType::Dragon => "dragon",
        }
    }

    /// Parse an exact current type string.
    pub fn parse(type_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == type_name)
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            CurrentType::Character
            | CurrentType::Npc
            | CurrentType::Creature
            | CurrentType::Spirit
            | CurrentType::Horror
            | CurrentType::Dragon => DocumentKind::Actor,
            _ => DocumentKind::Item,
        }
    }

    /// Abilities hang off a parent item owned by the same actor.
    pub fn parent_type(&self) -> Option<CurrentType> {
        match self {
            CurrentType::KnackAbility | CurrentType::KnackKarma | CurrentType::KnackManeuver => {
                Some(CurrentType::Talent)
            }
            CurrentType::SpellKnack => Some(CurrentType::Spell),
            _ => None,
        }
    }

    pub fn is_ability(&self) -> bool {
        self.parent_type().is_some()
    }

    /// Field migrators that apply to this type, in order.
    pub fn field_migrators(&self) -> Vec<&'static dyn FieldMigrator> {
        match self {
            CurrentType::Talent
            | CurrentType::Skill
            | CurrentType::Devotion
            | CurrentType::KnackAbility
            | CurrentType::KnackKarma
            | CurrentType::KnackManeuver => vec![
                &fields::DESCRIPTION,
                &fields::LEVEL,
                &fields::ATTRIBUTE,
                &fields::ACTION,
            ],
            CurrentType::SpellKnack | CurrentType::Spell => {
                vec![&fields::DESCRIPTION, &fields::LEVEL]
            }
            CurrentType::Weapon
            | CurrentType::Armor
            | CurrentType::Shield
            | CurrentType::Equipment => vec![&fields::DESCRIPTION, &fields::WEIGHT, &fields::PRICE],
            CurrentType::Namegiver | CurrentType::Discipline => vec![&fields::DESCRIPTION],
            CurrentType::Character
            | CurrentType::Npc
            | CurrentType::Creature
            | CurrentType::Spirit
            | CurrentType::Horror
            | CurrentType::Dragon => vec![&fields::DESCRIPTION],
        }
    }
}

impl fmt::Display for CurrentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field chain for any type string; unknown types still get a description.
pub fn field_chain_for(type_name: &str) -> Vec<&'static dyn FieldMigrator> {
    match CurrentType::parse(type_name) {
        Some(current) => current.field_migrators(),
        None => vec![&fields::DESCRIPTION],
    }
}

/// Run the business rules for the document's current type.
pub fn migrate(document: &mut Document, ctx: &mut MigrationContext<'_>) -> HandlerOutcome {
    let Some(current) = CurrentType::parse(document.doc_type()) else {
        let doc_type = document.doc_type().to_string();
        ctx.issues().info(
            format!("No document-type migration for type '{doc_type}'"),
            json!({ "type": doc_type, "kind": document.kind().as_str() }),
        );
        return HandlerOutcome::Keep;
    };

    if current.kind() != document.kind() {
        ctx.issues().warning(
            format!("Type '{current}' is not valid for a {}", document.kind()),
            json!({ "type": current.as_str(), "kind": document.kind().as_str() }),
        );
        return HandlerOutcome::Keep;
    }

    match current {
        CurrentType::Talent | CurrentType::Devotion => {
            items::ensure_edid(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Skill => {
            items::ensure_edid(document, ctx);
            items::migrate_skill(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::KnackAbility
        | CurrentType::KnackKarma
        | CurrentType::KnackManeuver
        | CurrentType::SpellKnack => {
            items::ensure_edid(document, ctx);
            abilities::link_to_parent(document, current, ctx)
        }
        CurrentType::Spell => {
            items::ensure_edid(document, ctx);
            items::migrate_spell(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Weapon => {
            items::ensure_edid(document, ctx);
            items::migrate_weapon(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Armor | CurrentType::Shield => {
            items::ensure_edid(document, ctx);
            items::migrate_protection(document, current, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Equipment => {
            items::ensure_edid(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Namegiver => {
            items::ensure_edid(document, ctx);
            items::migrate_namegiver(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Discipline => {
            items::ensure_edid(document, ctx);
            items::migrate_discipline(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Character => {
            actors::migrate_common(document, ctx);
            actors::migrate_character(document, ctx);
            HandlerOutcome::Keep
        }
        CurrentType::Npc
        | CurrentType::Creature
        | CurrentType::Spirit
        | CurrentType::Horror
        | CurrentType::Dragon => {
            actors::migrate_common(document, ctx);
            actors::migrate_creature_like(document, ctx);
            HandlerOutcome::Keep
        }
    }
}
