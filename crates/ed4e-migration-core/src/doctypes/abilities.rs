//! Knacks and spell knacks: link each ability to the parent it refines.
//!
//! Legacy abilities cached the parent's display name. Current abilities point
//! at the parent by identifier, plus a typed reference to the sibling item
//! on the same actor. An embedded ability whose parent can't be found is
//! removed from the actor; that removal is always recorded as an error.

use super::CurrentType;
use crate::document::Document;
use crate::naming::slugify;
use crate::registry::{HandlerOutcome, MigrationContext, OwnerContext};
use serde_json::json;

/// Legacy `system` key caching the parent's display name.
pub const LEGACY_PARENT_NAME_KEY: &str = "sourceTalentName";
/// `system` key holding the parent's identifier.
pub const PARENT_EDID_KEY: &str = "sourceTalent";
/// `system` key holding the `{ id, type }` reference to the parent item.
pub const PARENT_REF_KEY: &str = "sourceItem";

pub(super) fn link_to_parent(
    document: &mut Document,
    current: CurrentType,
    ctx: &mut MigrationContext<'_>,
) -> HandlerOutcome {
    let Some(parent_type) = current.parent_type() else {
        return HandlerOutcome::Keep;
    };

    let cached_name = document
        .system_mut()
        .remove(LEGACY_PARENT_NAME_KEY)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|name| !name.trim().is_empty());
    let existing_edid = document
        .system_str(PARENT_EDID_KEY)
        .filter(|edid| !edid.is_empty())
        .map(str::to_string);

    let wanted = match (&existing_edid, &cached_name) {
        (Some(edid), _) => edid.clone(),
        (None, Some(name)) => slugify(name),
        (None, None) => String::new(),
    };

    let Some(owner) = ctx.owner() else {
        // World-level ability: there are no siblings to resolve against.
        if existing_edid.is_none() && !wanted.is_empty() {
            document
                .system_mut()
                .insert(PARENT_EDID_KEY.to_string(), json!(wanted));
        }
        if cached_name.is_some() || existing_edid.is_none() {
            ctx.issues().todo(
                format!("Parent {parent_type} can only be linked once this {current} is owned by an actor"),
                json!({ "parentType": parent_type.as_str(), "parentEdid": wanted }),
            );
        }
        return HandlerOutcome::Keep;
    };

    // Re-runs and already-current abilities: keep an existing valid link.
    if cached_name.is_none() && existing_edid.is_some() && document_links(document, owner) {
        return HandlerOutcome::Keep;
    }

    match owner.find(parent_type.as_str(), &wanted) {
        Some(parent) => {
            let system = document.system_mut();
            system.insert(PARENT_EDID_KEY.to_string(), json!(parent.edid));
            system.insert(
                PARENT_REF_KEY.to_string(),
                json!({ "id": parent.id, "type": parent.doc_type }),
            );
            ctx.issues().info(
                format!("Linked to {parent_type} '{}'", parent.name),
                json!({ "parentId": parent.id, "parentEdid": parent.edid }),
            );
            HandlerOutcome::Keep
        }
        None => {
            let looked_for = cached_name.unwrap_or_else(|| wanted.clone());
            let reason = format!(
                "No {parent_type} '{looked_for}' on {} ({}); {} '{}' removed",
                owner.name,
                owner.id,
                current,
                document.name()
            );
            ctx.issues().error(
                reason.clone(),
                json!({
                    "parentType": parent_type.as_str(),
                    "parentEdid": wanted,
                    "ownerId": owner.id,
                    "ownerName": owner.name,
                }),
            );
            HandlerOutcome::Remove { reason }
        }
    }
}

/// Whether the ability's stored reference still points at a real sibling.
fn document_links(document: &Document, owner: &OwnerContext) -> bool {
    let Some(reference) = document
        .system()
        .and_then(|s| s.get(PARENT_REF_KEY))
        .and_then(|r| r.as_object())
    else {
        return false;
    };
    let id = reference.get("id").and_then(|v| v.as_str());
    owner
        .siblings
        .iter()
        .any(|s| Some(s.id.as_str()) == id && document.system_str(PARENT_EDID_KEY) == Some(s.edid.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SourceSystem;
    use crate::document::DocumentKind;
    use crate::ledger::{IssueLedger, Severity, Subject};
    use serde_json::Value;

    fn owner_with_talent() -> (Document, OwnerContext) {
        let actor = Document::new(DocumentKind::Actor, json!({ "_id": "a1", "name": "Ardan", "type": "npc" }));
        let mut owner = OwnerContext::new(&actor);
        owner.push_sibling(&Document::new(
            DocumentKind::Item,
            json!({ "_id": "t1", "name": "Melee Weapons", "type": "talent", "system": { "edid": "melee-weapons" } }),
        ));
        (actor, owner)
    }

    fn knack(system: Value) -> Document {
        Document::new(
            DocumentKind::Item,
            json!({ "_id": "k1", "name": "Riposte", "type": "knackAbility", "system": system }),
        )
    }

    fn link(doc: &mut Document, actor: &Document, owner: Option<&OwnerContext>) -> (HandlerOutcome, IssueLedger) {
        let mut ledger = IssueLedger::new();
        let source = SourceSystem::new("earthdawn4e");
        let outcome = {
            let mut ctx = MigrationContext::new(&source, owner, ledger.sink(Subject::embedded_in(doc, actor)));
            link_to_parent(doc, CurrentType::KnackAbility, &mut ctx)
        };
        (outcome, ledger)
    }

    #[test]
    fn test_links_by_cached_name() {
        let (actor, owner) = owner_with_talent();
        let mut doc = knack(json!({ "sourceTalentName": "Melee Weapons" }));

        let (outcome, ledger) = link(&mut doc, &actor, Some(&owner));
        assert_eq!(outcome, HandlerOutcome::Keep);
        let system = doc.system().unwrap();
        assert_eq!(system[PARENT_EDID_KEY], "melee-weapons");
        assert_eq!(system[PARENT_REF_KEY], json!({ "id": "t1", "type": "talent" }));
        assert!(!system.contains_key(LEGACY_PARENT_NAME_KEY));
        assert_eq!(ledger.count(Severity::Info), 1);

        let (outcome, ledger) = link(&mut doc, &actor, Some(&owner));
        assert_eq!(outcome, HandlerOutcome::Keep);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_orphan_is_removed_with_one_error() {
        let (actor, owner) = owner_with_talent();
        let mut doc = knack(json!({ "sourceTalentName": "Thread Weaving" }));

        let (outcome, ledger) = link(&mut doc, &actor, Some(&owner));
        assert!(matches!(outcome, HandlerOutcome::Remove { .. }));
        assert_eq!(ledger.len(), 1);
        let issue = &ledger.issues()[0];
        assert_eq!(issue.severity, Severity::Error);
        assert!(issue.message.contains("Riposte"));
        assert!(issue.message.contains("Ardan"));
        assert_eq!(issue.subject.owner, Some(("a1".to_string(), "Ardan".to_string())));
    }

    #[test]
    fn test_world_level_ability_gets_placeholder() {
        let (actor, _) = owner_with_talent();
        let mut doc = knack(json!({ "sourceTalentName": "Melee Weapons" }));

        let (outcome, ledger) = link(&mut doc, &actor, None);
        assert_eq!(outcome, HandlerOutcome::Keep);
        assert_eq!(doc.system_str(PARENT_EDID_KEY), Some("melee-weapons"));
        assert_eq!(ledger.count(Severity::Todo), 1);
    }
}
