use crate::document::Document;
use crate::fields::coerce_non_negative;
use crate::naming::{fold, slugify};
use crate::registry::MigrationContext;

use super::CurrentType;
use serde_json::{json, Map, Value};

/// Child object under `key`, created (or replaced if not an object) on demand.
pub(super) fn object_slot<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(child) => child,
        _ => unreachable!("slot was just made an object"),
    }
}

/// Move a flat legacy number to the nested `path`, coerced to a
/// non-negative integer. An existing canonical value is never overwritten.
///
/// Returns `(legacy value, stored value)` when the legacy key was present.
pub(super) fn relocate_integer(
    system: &mut Map<String, Value>,
    legacy_key: &str,
    path: &[&str],
) -> Option<(Value, Value)> {
    let (child, parents) = path.split_last()?;
    let raw = system.remove(legacy_key)?;
    let mut target = system;
    for key in parents {
        target = object_slot(target, key);
    }
    let stored = match target.get(*child) {
        Some(existing) if existing.is_number() => existing.clone(),
        _ => {
            let value = json!(coerce_non_negative(&raw).trunc() as u64);
            target.insert(child.to_string(), value.clone());
            value
        }
    };
    Some((raw, stored))
}

pub(super) fn ensure_edid(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    if document.system_str("edid").is_some_and(|e| !e.is_empty()) {
        return;
    }
    let edid = slugify(document.name());
    if edid.is_empty() {
        ctx.issues().todo(
            "Cannot derive an identifier from an empty name",
            json!({ "field": "edid" }),
        );
        return;
    }
    document
        .system_mut()
        .insert("edid".to_string(), json!(edid));
    ctx.issues()
        .info(format!("Assigned identifier '{edid}'"), json!({ "edid": edid }));
}

pub(super) fn migrate_skill(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    let artisan = system.remove("artisan").and_then(|v| v.as_bool());
    let knowledge = system.remove("knowledge").and_then(|v| v.as_bool());
    if artisan.is_none() && knowledge.is_none() {
        return;
    }
    if system.get("skillType").is_some_and(Value::is_string) {
        return;
    }

    let skill_type = match (artisan, knowledge) {
        (Some(true), Some(true)) => {
            ctx.issues().warning(
                "Skill flagged as both artisan and knowledge; using artisan",
                json!({ "artisan": true, "knowledge": true }),
            );
            "artisan"
        }
        (Some(true), _) => "artisan",
        (_, Some(true)) => "knowledge",
        _ => "general",
    };
    system.insert("skillType".to_string(), json!(skill_type));
    ctx.issues()
        .info("Derived skill type", json!({ "skillType": skill_type }));
}

const SPELLCASTING_TYPES: [&str; 5] = [
    "elementalism",
    "illusionism",
    "nethermancy",
    "shamanism",
    "wizardry",
];

fn spellcasting_type(raw: &str) -> Option<&'static str> {
    let key = fold(raw.trim());
    SPELLCASTING_TYPES.into_iter().find(|t| {
        // accept the discipline name as well as the school
        key == *t
            || (*t == "elementalism" && key == "elementalist")
            || (*t == "illusionism" && key == "illusionist")
            || (*t == "nethermancy" && key == "nethermancer")
            || (*t == "shamanism" && key == "shaman")
            || (*t == "wizardry" && key == "wizard")
    })
}

pub(super) fn migrate_spell(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    let Some(raw) = system.remove("discipline") else {
        return;
    };
    if system.get("spellcastingType").is_some_and(|v| v.as_str().is_some_and(|s| !s.is_empty())) {
        return;
    }
    let text = raw.as_str().unwrap_or_default().to_string();
    match spellcasting_type(&text) {
        Some(found) => {
            system.insert("spellcastingType".to_string(), json!(found));
            ctx.issues().info(
                "Derived spellcasting type",
                json!({ "from": text, "to": found }),
            );
        }
        None => {
            system.insert("spellcastingType".to_string(), json!(""));
            ctx.issues().todo(
                format!("Unknown spellcasting discipline '{text}'; set the spellcasting type by hand"),
                json!({ "from": raw }),
            );
        }
    }
}

const WEAPON_TYPES: [&str; 4] = ["melee", "missile", "thrown", "unarmed"];

pub(super) fn migrate_weapon(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    if let Some((from, to)) = relocate_integer(system, "damagestep", &["damage", "baseStep"]) {
        ctx.issues().info(
            "Moved damage step",
            json!({ "from": from, "to": to, "field": "damage.baseStep" }),
        );
    }

    let Some(raw) = system.get("weaponType").and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    if WEAPON_TYPES.contains(&raw.as_str()) {
        return;
    }
    let canonical = match fold(raw.trim()).as_str() {
        "melee" | "close" | "closecombat" | "close combat" => Some("melee"),
        "missile" | "ranged" | "projectile" => Some("missile"),
        "thrown" | "throwing" => Some("thrown"),
        "unarmed" | "natural" => Some("unarmed"),
        _ => None,
    };
    match canonical {
        Some(found) => {
            system.insert("weaponType".to_string(), json!(found));
            ctx.issues()
                .info("Normalized weapon type", json!({ "from": raw, "to": found }));
        }
        None => {
            system.insert("weaponType".to_string(), json!("melee"));
            ctx.issues().warning(
                format!("Unrecognized weapon type '{raw}', defaulted to melee"),
                json!({ "from": raw, "to": "melee" }),
            );
        }
    }
}

pub(super) fn migrate_protection(
    document: &mut Document,
    current: CurrentType,
    ctx: &mut MigrationContext<'_>,
) {
    let system = document.system_mut();
    let mut moved = Map::new();
    for (legacy, child) in [("physicalarmor", "physical"), ("mysticarmor", "mystical")] {
        if let Some((_, to)) = relocate_integer(system, legacy, &["armor", child]) {
            moved.insert(child.to_string(), to);
        }
    }
    if current == CurrentType::Shield {
        if let Some(raw) = system.remove("shatterthreshold") {
            if !system.contains_key("shatterThreshold") {
                let value = json!(coerce_non_negative(&raw).trunc() as u64);
                system.insert("shatterThreshold".to_string(), value);
            }
            moved.insert("shatterThreshold".to_string(), system["shatterThreshold"].clone());
        }
    }
    if !moved.is_empty() {
        ctx.issues()
            .info("Restructured armor values", Value::Object(moved));
    }
}

pub(super) fn migrate_namegiver(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    match system.get("movement") {
        Some(Value::Object(_)) | None => {}
        Some(scalar) => {
            let walk = coerce_non_negative(scalar).trunc() as u64;
            let from = scalar.clone();
            system.insert("movement".to_string(), json!({ "walk": walk }));
            ctx.issues()
                .info("Structured movement", json!({ "from": from, "to": { "walk": walk } }));
        }
    }
}

pub(super) fn migrate_discipline(document: &mut Document, ctx: &mut MigrationContext<'_>) {
    let system = document.system_mut();
    if let Some(raw) = system.get("durability").filter(|v| v.as_u64().is_none()).cloned() {
        let durability = coerce_non_negative(&raw).trunc() as u64;
        system.insert("durability".to_string(), json!(durability));
        ctx.issues()
            .info("Normalized durability", json!({ "from": raw, "to": durability }));
    }
    if !system.contains_key("advancement") {
        ctx.issues().todo(
            "Discipline has no advancement table; review circles and talent options",
            json!({ "field": "advancement" }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SourceSystem;
    use crate::document::DocumentKind;
    use crate::ledger::{IssueLedger, Severity, Subject};

    fn run(
        doc_type: &str,
        system: Value,
        f: impl FnOnce(&mut Document, &mut MigrationContext<'_>),
    ) -> (Document, IssueLedger) {
        let mut doc = Document::new(
            DocumentKind::Item,
            json!({ "_id": "i", "name": "Test Item", "type": doc_type, "system": system }),
        );
        let mut ledger = IssueLedger::new();
        let source = SourceSystem::new("earthdawn4e");
        {
            let mut ctx = MigrationContext::new(&source, None, ledger.sink(Subject::of(&doc)));
            f(&mut doc, &mut ctx);
        }
        (doc, ledger)
    }

    #[test]
    fn test_ensure_edid() {
        let (doc, ledger) = run("talent", json!({}), ensure_edid);
        assert_eq!(doc.system_str("edid"), Some("test-item"));
        assert_eq!(ledger.count(Severity::Info), 1);

        let (doc, ledger) = run("talent", json!({ "edid": "keep-me" }), ensure_edid);
        assert_eq!(doc.system_str("edid"), Some("keep-me"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_skill_type_from_flags() {
        let (doc, _) = run("skill", json!({ "artisan": false, "knowledge": true }), migrate_skill);
        let system = doc.system().unwrap();
        assert_eq!(system["skillType"], "knowledge");
        assert!(!system.contains_key("knowledge"));
    }

    #[test]
    fn test_spell_discipline() {
        let (doc, _) = run("spell", json!({ "discipline": "Nethermancer" }), migrate_spell);
        assert_eq!(doc.system_str("spellcastingType"), Some("nethermancy"));

        let (doc, ledger) = run("spell", json!({ "discipline": "Chronomancer" }), migrate_spell);
        assert_eq!(doc.system_str("spellcastingType"), Some(""));
        assert_eq!(ledger.count(Severity::Todo), 1);
    }

    #[test]
    fn test_weapon() {
        let (doc, _) = run(
            "weapon",
            json!({ "damagestep": "5", "weaponType": "Ranged" }),
            migrate_weapon,
        );
        let system = doc.system().unwrap();
        assert_eq!(system["damage"]["baseStep"], 5);
        assert_eq!(system["weaponType"], "missile");
        assert!(!system.contains_key("damagestep"));

        let (doc, ledger) = run("weapon", json!({ "weaponType": "psychic" }), migrate_weapon);
        assert_eq!(doc.system_str("weaponType"), Some("melee"));
        assert_eq!(ledger.count(Severity::Warning), 1);
    }

    #[test]
    fn test_shield() {
        let (doc, _) = run(
            "shield",
            json!({ "physicalarmor": 2, "mysticarmor": "1", "shatterthreshold": 19 }),
            |d, c| migrate_protection(d, CurrentType::Shield, c),
        );
        let system = doc.system().unwrap();
        assert_eq!(system["armor"], json!({ "physical": 2, "mystical": 1 }));
        assert_eq!(system["shatterThreshold"], 19);
    }

    #[test]
    fn test_namegiver_and_discipline() {
        let (doc, _) = run("namegiver", json!({ "movement": "12" }), migrate_namegiver);
        assert_eq!(doc.system().unwrap()["movement"], json!({ "walk": 12 }));

        let (doc, ledger) = run("discipline", json!({ "durability": "7" }), migrate_discipline);
        assert_eq!(doc.system().unwrap()["durability"], 7);
        assert_eq!(ledger.count(Severity::Todo), 1);
    }
}
