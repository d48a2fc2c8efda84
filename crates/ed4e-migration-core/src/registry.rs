//! Explicit registry of per-system migrations.
//!
//! Legacy support modules register three things against their source
//! system: simple type renames, at most one predicate-based complex type
//! rule, and one handler per document kind. Registration is append-only.
//! The orchestrator takes the finished registry behind an `Arc`.

use crate::detect::{SourceSystem, StructuralSignature};
use crate::doctypes::{ACTOR_TYPE_VOCABULARY, ITEM_TYPE_VOCABULARY};
use crate::document::{Bucket, Document, DocumentKind};
use crate::ledger::IssueSink;
use crate::naming::normalize_type_key;
use crate::tracker::TransformedDocuments;
use crate::{MigrationError, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What the orchestrator should do with a document after its handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Keep,
    /// Drop the document (embedded items only). The handler has already
    /// recorded the matching `error` issue.
    Remove { reason: String },
}

/// One item already migrated on the same owning actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingItem {
    pub id: String,
    pub doc_type: String,
    pub name: String,
    pub edid: String,
}

/// Read-only view of the actor that owns the document being migrated.
#[derive(Debug, Clone, Default)]
pub struct OwnerContext {
    pub id: String,
    pub name: String,
    pub siblings: Vec<SiblingItem>,
}

impl OwnerContext {
    pub fn new(owner: &Document) -> Self {
        Self {
            id: owner.id().to_string(),
            name: owner.name().to_string(),
            siblings: Vec::new(),
        }
    }

    /// Snapshot a migrated sibling so later items can link to it.
    pub fn push_sibling(&mut self, item: &Document) {
        self.siblings.push(SiblingItem {
            id: item.id().to_string(),
            doc_type: item.doc_type().to_string(),
            name: item.name().to_string(),
            edid: item.system_str("edid").unwrap_or_default().to_string(),
        });
    }

    /// First sibling of `doc_type` whose edid equals `edid`.
    pub fn find(&self, doc_type: &str, edid: &str) -> Option<&SiblingItem> {
        self.siblings
            .iter()
            .find(|s| s.doc_type == doc_type && !s.edid.is_empty() && s.edid == edid)
    }
}

/// Everything a handler may touch besides the document itself.
pub struct MigrationContext<'a> {
    source_system: &'a SourceSystem,
    owner: Option<&'a OwnerContext>,
    sink: IssueSink<'a>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(
        source_system: &'a SourceSystem,
        owner: Option<&'a OwnerContext>,
        sink: IssueSink<'a>,
    ) -> Self {
        Self {
            source_system,
            owner,
            sink,
        }
    }

    pub fn source_system(&self) -> &SourceSystem {
        self.source_system
    }

    /// The owning actor, for embedded items.
    pub fn owner(&self) -> Option<&'a OwnerContext> {
        self.owner
    }

    pub fn issues(&mut self) -> &mut IssueSink<'a> {
        &mut self.sink
    }
}

/// Per-system, per-kind document handler.
pub trait MigrationHandler: Send + Sync {
    fn migrate(
        &self,
        document: &mut Document,
        ctx: &mut MigrationContext<'_>,
    ) -> Result<HandlerOutcome>;
}

impl<F> MigrationHandler for F
where
    F: Fn(&mut Document, &mut MigrationContext<'_>) -> Result<HandlerOutcome> + Send + Sync,
{
    fn migrate(
        &self,
        document: &mut Document,
        ctx: &mut MigrationContext<'_>,
    ) -> Result<HandlerOutcome> {
        self(document, ctx)
    }
}

/// Predicate-based type rule: returns the new type, or `None` to abstain.
pub type ComplexTypeTransform = Arc<dyn Fn(&Document) -> Option<String> + Send + Sync>;

/// A legacy schema family the pipeline knows how to migrate.
pub trait LegacySystemSupport {
    fn id(&self) -> SourceSystem;

    /// Structural signatures that identify documents of this system.
    fn signatures(&self) -> Vec<StructuralSignature>;

    /// Register transforms and handlers.
    fn register(&self, registry: &mut MigrationRegistry) -> Result<()>;
}

/// Registered transforms and handlers, keyed by source system.
#[derive(Default)]
pub struct MigrationRegistry {
    simple: HashMap<SourceSystem, HashMap<String, String>>,
    complex: HashMap<SourceSystem, ComplexTypeTransform>,
    handlers: HashMap<(SourceSystem, DocumentKind), Arc<dyn MigrationHandler>>,
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("simple", &self.simple)
            .field("complex", &self.complex.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register everything a legacy support module provides.
    pub fn install(&mut self, support: &dyn LegacySystemSupport) -> Result<()> {
        debug!("Registering migrations for {}", support.id());
        support.register(self)
    }

    pub fn register_migration(
        &mut self,
        source_system: impl Into<SourceSystem>,
        kind: DocumentKind,
        handler: impl MigrationHandler + 'static,
    ) -> Result<()> {
        let source_system = source_system.into();
        let key = (source_system, kind);
        if self.handlers.contains_key(&key) {
            return Err(MigrationError::DuplicateRegistration {
                source_system: key.0.to_string(),
                what: format!("{} handler", kind),
            });
        }
        self.handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    /// Register a rename. The source type is matched case- and
    /// diacritic-insensitively.
    pub fn register_type_transform(
        &mut self,
        source_system: impl Into<SourceSystem>,
        source_type: &str,
        target_type: &str,
    ) -> Result<()> {
        let source_system = source_system.into();
        let key = normalize_type_key(source_type);
        if key.is_empty() || target_type.trim().is_empty() {
            return Err(MigrationError::Registration {
                source_system: source_system.to_string(),
                message: format!("empty type in rule '{source_type}' -> '{target_type}'"),
            });
        }

        let rules = self.simple.entry(source_system.clone()).or_default();
        match rules.get(&key) {
            Some(existing) if existing != target_type => Err(MigrationError::DuplicateRegistration {
                source_system: source_system.to_string(),
                what: format!("type transform for '{source_type}'"),
            }),
            Some(_) => Ok(()),
            None => {
                rules.insert(key, target_type.to_string());
                Ok(())
            }
        }
    }

    pub fn register_complex_type_transform<F>(
        &mut self,
        source_system: impl Into<SourceSystem>,
        predicate: F,
    ) -> Result<()>
    where
        F: Fn(&Document) -> Option<String> + Send + Sync + 'static,
    {
        let source_system = source_system.into();
        if self.complex.contains_key(&source_system) {
            return Err(MigrationError::DuplicateRegistration {
                source_system: source_system.to_string(),
                what: "complex type transform".to_string(),
            });
        }
        self.complex.insert(source_system, Arc::new(predicate));
        Ok(())
    }

    pub fn handler(
        &self,
        source_system: &SourceSystem,
        kind: DocumentKind,
    ) -> Option<Arc<dyn MigrationHandler>> {
        self.handlers
            .get(&(source_system.clone(), kind))
            .cloned()
    }

    /// Whether anything at all was registered for a system.
    pub fn knows(&self, source_system: &SourceSystem) -> bool {
        self.simple.contains_key(source_system)
            || self.complex.contains_key(source_system)
            || self.handlers.keys().any(|(s, _)| s == source_system)
    }

    /// Simple lookup only, without touching the document.
    pub fn simple_target(&self, source_system: &SourceSystem, doc_type: &str) -> Option<&str> {
        self.simple
            .get(source_system)?
            .get(&normalize_type_key(doc_type))
            .map(String::as_str)
    }

    /// Apply the simple rename, then the complex rule.
    ///
    /// A complex rule wins when it returns a type different from the one the
    /// simple rule left. Complex changes are recorded in `tracker`. Returns
    /// whether the document's type changed.
    pub fn apply_type_transforms(
        &self,
        document: &mut Document,
        source_system: &SourceSystem,
        tracker: &mut TransformedDocuments,
        sink: &mut IssueSink<'_>,
    ) -> bool {
        let original = document.doc_type().to_string();

        if let Some(target) = self.simple_target(source_system, &original) {
            if target != original {
                let target = target.to_string();
                document.set_type(target.as_str());
                sink.retype(&target);
                sink.info(
                    format!("Renamed type '{original}' to '{target}'"),
                    json!({ "from": original, "to": target, "rule": "simple" }),
                );
            }
        }

        if let Some(complex) = self.complex.get(source_system) {
            let before = document.doc_type().to_string();
            if let Some(target) = complex(document).filter(|t| *t != before && !t.is_empty()) {
                document.set_type(target.as_str());
                sink.retype(&target);
                sink.info(
                    format!("Resolved type '{before}' to '{target}'"),
                    json!({ "from": before, "to": target, "rule": "complex" }),
                );

                let bucket = tracking_bucket(document.kind(), &before, &target);
                if bucket == Bucket::Unknown {
                    sink.warning(
                        format!("Type change '{before}' -> '{target}' matches no known vocabulary; tracked as unknown"),
                        json!({ "from": before, "to": target }),
                    );
                }
                tracker.add(bucket, document.id());
            }
        }

        document.doc_type() != original
    }

    /// Drop every registration. Test isolation only.
    pub fn clear(&mut self) {
        self.simple.clear();
        self.complex.clear();
        self.handlers.clear();
    }
}

/// Bucket for a complex type change.
///
/// Either type string being a known actor (item) type selects the actors
/// (items) bucket; actor wins when both match, disambiguated by the
/// document's own kind.
fn tracking_bucket(kind: DocumentKind, old_type: &str, new_type: &str) -> Bucket {
    let actor = ACTOR_TYPE_VOCABULARY.contains(&old_type) || ACTOR_TYPE_VOCABULARY.contains(&new_type);
    let item = ITEM_TYPE_VOCABULARY.contains(&old_type) || ITEM_TYPE_VOCABULARY.contains(&new_type);
    match (actor, item) {
        (true, true) => kind.bucket(),
        (true, false) => Bucket::Actors,
        (false, true) => Bucket::Items,
        (false, false) => Bucket::Unknown,
    }
}
