//! Batch migration driver.
//!
//! One [`MigrationOrchestrator`] owns the issue ledger and the transformed
//! document tracker for a batch. Documents go through a synchronous pipeline:
//!
//! ```text
//! Detected → TypeTransformed → FieldMigrated → DocumentTypeMigrated → Stamped
//! ```
//!
//! Embedded items of an actor run in two passes. Parents (talents, spells,
//! everything that isn't an ability) complete first so abilities can link to
//! them. [`MigrationOrchestrator::finalize`] then runs the fix-up passes,
//! writes every changed top-level document once, and assembles the report.

use crate::config::{MigrationConfig, MigrationOptions};
use crate::detect::{Detection, Detector, SourceSystem};
use crate::doctypes::{self, CurrentType};
use crate::document::{Bucket, Document, DocumentKind};
use crate::fields;
use crate::fixup::{FixupPass, TypedReferenceFixup};
use crate::ledger::{IssueLedger, Severity, Subject};
use crate::registry::{HandlerOutcome, MigrationContext, MigrationRegistry, OwnerContext};
use crate::report::{assemble_report, ReportArtifact, ReportBuilder};
use crate::store::{DocumentStore, DocumentUpdate};
use crate::tracker::TransformedDocuments;
use crate::{legacy, MigrationError, Result};
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Furthest pipeline stage a document reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStage {
    Detected,
    TypeTransformed,
    FieldMigrated,
    DocumentTypeMigrated,
    Stamped,
}

/// A top-level document after the per-document pipeline.
#[derive(Debug, Clone)]
pub struct MigratedDocument {
    pub document: Document,
    pub detection: Detection,
    pub stage: MigrationStage,
    /// Ids of embedded items the handlers removed.
    pub removed_items: Vec<String>,
    /// Whether anything differs from what was loaded.
    pub changed: bool,
}

/// What [`MigrationOrchestrator::finalize`] did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSummary {
    pub documents: usize,
    pub changed: usize,
    pub written: usize,
    pub write_failures: Vec<String>,
    pub removed_items: usize,
    pub fixed_references: usize,
    pub issues: BTreeMap<Severity, usize>,
    pub report: Option<ReportArtifact>,
    pub report_error: Option<String>,
    pub dry_run: bool,
}

struct Prepared {
    document: Document,
    detection: Detection,
    source: Option<SourceSystem>,
    stage: MigrationStage,
}

impl Prepared {
    fn is_ability(&self) -> bool {
        CurrentType::parse(self.document.doc_type()).is_some_and(|t| t.is_ability())
    }
}

fn subject_for(document: &Document, owner: Option<&Document>) -> Subject {
    match owner {
        Some(owner) => Subject::embedded_in(document, owner),
        None => Subject::of(document),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Borrowed view of the orchestrator state one pipeline run needs.
struct Pass<'o> {
    registry: &'o MigrationRegistry,
    detector: &'o Detector,
    ledger: &'o mut IssueLedger,
    tracker: &'o mut TransformedDocuments,
}

impl Pass<'_> {
    /// Detect, lift the legacy container, transform the type, normalize fields.
    fn prepare(
        &mut self,
        mut document: Document,
        inherited: Option<&SourceSystem>,
        owner: Option<&Document>,
    ) -> Prepared {
        let detection = self.detector.detect(&document);
        let source = match (&detection, inherited) {
            (Detection::Legacy { system, .. }, _) => Some(system.clone()),
            (Detection::Unrecognized, Some(system)) => Some(system.clone()),
            _ => None,
        };
        let Some(source) = source else {
            debug!("{} needs no migration ({:?})", document.label(), detection);
            return Prepared {
                document,
                detection,
                source: None,
                stage: MigrationStage::Detected,
            };
        };

        let mut sink = self.ledger.sink(subject_for(&document, owner));
        if !self.registry.knows(&source) {
            warn!("{}: no migrations registered for {}", document.label(), source);
            sink.warning(
                format!("No migrations registered for source system '{source}'"),
                json!({ "sourceSystem": source }),
            );
            return Prepared {
                document,
                detection,
                source: None,
                stage: MigrationStage::Detected,
            };
        }

        debug!("Migrating {} from {}", document.label(), source);
        if document.lift_legacy_container() {
            sink.info(
                "Moved legacy payload into system",
                json!({ "from": MigrationConfig::LEGACY_PAYLOAD_KEY }),
            );
        }

        self.registry
            .apply_type_transforms(&mut document, &source, &mut *self.tracker, &mut sink);

        let chain = doctypes::field_chain_for(document.doc_type());
        fields::run_chain(&chain, document.system_mut(), &mut sink);

        Prepared {
            document,
            detection,
            source: Some(source),
            stage: MigrationStage::FieldMigrated,
        }
    }

    /// Run the registered handler and stamp the document.
    ///
    /// A handler that fails or panics leaves the document as it was before
    /// the handler ran; it is still stamped so the next run skips it.
    fn complete(
        &mut self,
        prepared: &mut Prepared,
        owner_ctx: Option<&OwnerContext>,
        owner: Option<&Document>,
    ) -> HandlerOutcome {
        let Some(source) = prepared.source.clone() else {
            return HandlerOutcome::Keep;
        };
        let document = &mut prepared.document;
        let kind = document.kind();
        let handler = self.registry.handler(&source, kind);
        let mut ctx = MigrationContext::new(
            &source,
            owner_ctx,
            self.ledger.sink(subject_for(document, owner)),
        );

        let outcome = match handler {
            None => {
                ctx.issues().info(
                    format!("No {kind} handler registered for {source}"),
                    json!({ "sourceSystem": source }),
                );
                HandlerOutcome::Keep
            }
            Some(handler) => {
                let snapshot = document.clone();
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| handler.migrate(document, &mut ctx)));
                let failure = match result {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => Err(MigrationError::handler(snapshot.label(), e.to_string())),
                    Err(payload) => Err(MigrationError::handler(snapshot.label(), panic_message(payload))),
                };
                match failure {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("{}", e);
                        *document = snapshot;
                        ctx.issues()
                            .error(e.to_string(), json!({ "sourceSystem": source }));
                        HandlerOutcome::Keep
                    }
                }
            }
        };

        prepared.stage = MigrationStage::DocumentTypeMigrated;
        if outcome == HandlerOutcome::Keep {
            prepared
                .document
                .stamp(source.as_str(), MigrationConfig::TARGET_SCHEMA_VERSION);
            prepared.stage = MigrationStage::Stamped;
        }
        outcome
    }

    /// Two-pass migration of an actor's embedded items.
    fn migrate_embedded(
        &mut self,
        items: Vec<Document>,
        inherited: Option<&SourceSystem>,
        owner: &Document,
        removed: &mut Vec<String>,
    ) -> Vec<Document> {
        let mut prepared: Vec<Prepared> = items
            .into_iter()
            .map(|item| self.prepare(item, inherited, Some(owner)))
            .collect();
        let mut keep = vec![true; prepared.len()];
        let mut owner_ctx = OwnerContext::new(owner);

        for abilities in [false, true] {
            for (index, item) in prepared.iter_mut().enumerate() {
                if item.is_ability() != abilities {
                    continue;
                }
                match self.complete(item, Some(&owner_ctx), Some(owner)) {
                    HandlerOutcome::Keep => {
                        if !abilities {
                            owner_ctx.push_sibling(&item.document);
                        }
                    }
                    HandlerOutcome::Remove { reason } => {
                        info!("Removing {} from {}: {}", item.document.label(), owner.label(), reason);
                        removed.push(item.document.id().to_string());
                        keep[index] = false;
                    }
                }
            }
        }

        prepared
            .into_iter()
            .zip(keep)
            .filter_map(|(item, kept)| kept.then_some(item.document))
            .collect()
    }

    fn migrate_top_level(&mut self, mut document: Document) -> MigratedDocument {
        let original = document.clone();
        let stored_items = original.as_map().get("items").cloned();
        let items = match document.kind() {
            DocumentKind::Actor => document.take_embedded_items(),
            DocumentKind::Item => Vec::new(),
        };

        let mut prepared = self.prepare(document, None, None);
        if let HandlerOutcome::Remove { reason } = self.complete(&mut prepared, None, None) {
            warn!("Cannot remove top-level {}: {}", prepared.document.label(), reason);
            self.ledger.record(
                Severity::Warning,
                Subject::of(&prepared.document),
                "Top-level documents are never removed; kept as is",
                json!({ "reason": reason }),
            );
            if let Some(source) = &prepared.source {
                prepared
                    .document
                    .stamp(source.as_str(), MigrationConfig::TARGET_SCHEMA_VERSION);
                prepared.stage = MigrationStage::Stamped;
            }
        }

        let mut removed_items = Vec::new();
        if let Some(stored_items) = stored_items {
            let inherited = prepared.source.clone();
            let loaded = items.clone();
            let items = self.migrate_embedded(
                items,
                inherited.as_ref(),
                &prepared.document,
                &mut removed_items,
            );
            if items == loaded {
                // Nothing embedded changed: keep the stored array verbatim.
                prepared.document.as_map_mut().insert("items".to_string(), stored_items);
            } else {
                prepared.document.set_embedded_items(items);
            }
        }

        let changed = prepared.document != original;
        MigratedDocument {
            document: prepared.document,
            detection: prepared.detection,
            stage: prepared.stage,
            removed_items,
            changed,
        }
    }
}

/// Drives detection, transformation, persistence and reporting for a batch.
pub struct MigrationOrchestrator {
    registry: Arc<MigrationRegistry>,
    detector: Detector,
    options: MigrationOptions,
    fixups: Vec<Box<dyn FixupPass>>,
    ledger: IssueLedger,
    tracker: TransformedDocuments,
    batch: Vec<MigratedDocument>,
}

impl MigrationOrchestrator {
    /// Create an orchestrator with the built-in typed reference fix-up.
    pub fn new(registry: Arc<MigrationRegistry>, detector: Detector) -> Self {
        Self {
            registry,
            detector,
            options: MigrationOptions::default(),
            fixups: vec![Box::new(TypedReferenceFixup)],
            ledger: IssueLedger::new(),
            tracker: TransformedDocuments::new(),
            batch: Vec::new(),
        }
    }

    /// Orchestrator wired with every built-in legacy system.
    pub fn with_builtin_systems(options: MigrationOptions) -> Result<Self> {
        let (registry, detector) = legacy::build_pipeline(&options.fallback_source_system)?;
        Ok(Self::new(Arc::new(registry), detector).with_options(options))
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fixup(mut self, fixup: Box<dyn FixupPass>) -> Self {
        self.fixups.push(fixup);
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &IssueLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &TransformedDocuments {
        &self.tracker
    }

    /// Documents migrated since the last finalize.
    pub fn batch(&self) -> &[MigratedDocument] {
        &self.batch
    }

    fn pass(&mut self) -> Pass<'_> {
        Pass {
            registry: &self.registry,
            detector: &self.detector,
            ledger: &mut self.ledger,
            tracker: &mut self.tracker,
        }
    }

    /// Classify a document without changing anything.
    pub fn detect(&self, document: &Document) -> Detection {
        self.detector.detect(document)
    }

    /// Run one top-level document (and its embedded items) through the
    /// pipeline and add it to the batch.
    pub fn migrate_document(&mut self, document: Document) -> &MigratedDocument {
        let migrated = self.pass().migrate_top_level(document);
        debug!(
            "{} reached {:?}{}",
            migrated.document.label(),
            migrated.stage,
            if migrated.changed { "" } else { " (unchanged)" }
        );
        self.batch.push(migrated);
        &self.batch[self.batch.len() - 1]
    }

    /// Migrate many documents. Returns how many changed.
    pub fn migrate_batch(&mut self, documents: impl IntoIterator<Item = Document>) -> usize {
        let mut changed = 0;
        for document in documents {
            if self.migrate_document(document).changed {
                changed += 1;
            }
        }
        changed
    }

    /// Load every actor and item from the store, migrate, then finalize.
    pub async fn run(
        &mut self,
        store: &dyn DocumentStore,
        report: Option<&mut dyn ReportBuilder>,
    ) -> Result<FinalizeSummary> {
        let actors = store.load_all(Bucket::Actors).await?;
        let items = store.load_all(Bucket::Items).await?;
        info!("Loaded {} actors and {} items", actors.len(), items.len());

        let changed = self.migrate_batch(items.into_iter().chain(actors));
        info!("{} documents changed in memory", changed);
        self.finalize(store, report).await
    }

    /// Fix up references, persist changed documents, and write the report.
    ///
    /// Each changed top-level document is written once, embedded changes
    /// included. A failed write is recorded and the remaining writes still
    /// happen. The ledger, tracker and batch are cleared afterwards.
    pub async fn finalize(
        &mut self,
        store: &dyn DocumentStore,
        report: Option<&mut dyn ReportBuilder>,
    ) -> Result<FinalizeSummary> {
        let mut batch = std::mem::take(&mut self.batch);
        let tracked = self.tracker.take();
        let mut summary = FinalizeSummary {
            documents: batch.len(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        // Fix-up
        let mut documents: Vec<Document> = batch.iter().map(|m| m.document.clone()).collect();
        for fixup in &self.fixups {
            let fixed = fixup.apply(&tracked, &mut documents, &mut self.ledger);
            if fixed > 0 {
                info!("Fix-up '{}' repaired {} references", fixup.name(), fixed);
            }
            summary.fixed_references += fixed;
        }
        for (migrated, fixed) in batch.iter_mut().zip(documents) {
            if migrated.document != fixed {
                migrated.document = fixed;
                migrated.changed = true;
            }
        }

        // Persistence
        for migrated in batch.iter().filter(|m| m.changed) {
            summary.changed += 1;
            summary.removed_items += migrated.removed_items.len();
            if self.options.dry_run {
                continue;
            }
            let update = DocumentUpdate::from_document(&migrated.document)
                .with_deletions(migrated.removed_items.iter().cloned());
            let bucket = migrated.document.kind().bucket();
            match store.write(bucket, update).await {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    warn!("Failed to save {}: {}", migrated.document.label(), e);
                    self.ledger.record(
                        Severity::Error,
                        Subject::of(&migrated.document),
                        format!("Failed to save migrated document: {e}"),
                        json!({ "error": e.to_string() }),
                    );
                    summary.write_failures.push(migrated.document.id().to_string());
                }
            }
        }
        info!(
            "Saved {} of {} changed documents{}",
            summary.written,
            summary.changed,
            if summary.dry_run { " (dry run)" } else { "" }
        );

        for severity in [Severity::Info, Severity::Warning, Severity::Todo, Severity::Error] {
            summary.issues.insert(severity, self.ledger.count(severity));
        }

        // Report
        if let Some(builder) = report {
            if self.ledger.is_empty() {
                debug!("Nothing to report");
            } else {
                match assemble_report(&self.ledger, store, builder, &self.options.report_title).await {
                    Ok(artifact) => {
                        info!("Migration report written to {}", artifact.location);
                        summary.report = Some(artifact);
                    }
                    Err(e) => {
                        warn!("Failed to write migration report: {}", e);
                        summary.report_error = Some(e.to_string());
                    }
                }
            }
        }

        self.ledger.clear();
        Ok(summary)
    }
}
