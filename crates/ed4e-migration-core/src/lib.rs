//! ED4e Migration - Headless migration of legacy Earthdawn 4e world documents.
//!
//! Legacy actors and items carry no schema tag. This crate classifies each
//! document by structure, routes it through registered type transforms,
//! field normalizers and per-type business rules, stamps it with the target
//! schema version, and records every outcome in an issue ledger that backs
//! the migration report. Re-running over migrated data is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use ed4e_migration::{JsonWorldStore, MigrationOptions, MigrationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> ed4e_migration::Result<()> {
//!     let options = MigrationOptions::load_from_world("/path/to/world".as_ref())?;
//!     let store = JsonWorldStore::new("/path/to/world").with_backups(options.keep_backup);
//!
//!     let mut orchestrator = MigrationOrchestrator::with_builtin_systems(options)?;
//!     let summary = orchestrator.run(&store, None).await?;
//!     println!("Wrote {} documents", summary.written);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod doctypes;
pub mod document;
pub mod error;
pub mod fields;
pub mod fixup;
pub mod ledger;
pub mod legacy;
pub mod naming;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod store;
pub mod tracker;

// Re-export commonly used types
pub use config::{MigrationConfig, MigrationOptions, PathsConfig, ReportConfig};
pub use detect::{Detection, Detector, Evidence, SourceSystem, StructuralSignature};
pub use doctypes::CurrentType;
pub use document::{Bucket, Document, DocumentKind};
pub use error::{MigrationError, Result};
pub use fields::{FieldMigrator, FieldNote};
pub use fixup::{FixupPass, TypedReferenceFixup};
pub use ledger::{IssueLedger, IssueSink, MigrationIssue, Severity, Subject};
pub use orchestrator::{FinalizeSummary, MigratedDocument, MigrationOrchestrator, MigrationStage};
pub use registry::{
    HandlerOutcome, LegacySystemSupport, MigrationContext, MigrationHandler, MigrationRegistry,
    OwnerContext,
};
pub use report::{assemble_report, ReportArtifact, ReportBuilder, ReportStyle};
pub use store::{DocumentStore, DocumentUpdate, JsonWorldStore};
pub use tracker::TransformedDocuments;
