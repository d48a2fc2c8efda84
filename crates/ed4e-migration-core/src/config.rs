//! Centralized configuration for the migration pipeline.
//!
//! Constant holders follow one struct per concern. Run-time options that a
//! host may want to change live in [`MigrationOptions`], which can be loaded
//! from a JSON file.

use crate::store::atomic_read_json;
use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema and stamping constants.
pub struct MigrationConfig;

impl MigrationConfig {
    /// Version of the current target schema written into every stamp.
    pub const TARGET_SCHEMA_VERSION: &'static str = "1.0.0";
    /// Namespace under `flags` owned by this system.
    pub const FLAGS_NAMESPACE: &'static str = "ed4e";
    /// Key under the flags namespace holding the migration version stamp.
    pub const FLAG_MIGRATION_VERSION: &'static str = "migrationVersion";
    /// Legacy boolean marker written by old migration scripts.
    pub const FLAG_LEGACY_MIGRATED: &'static str = "migrated";
    /// `system` key naming the source system a document came from.
    pub const SYSTEM_MIGRATION_SOURCE: &'static str = "migrationSource";
    /// `system` key holding the schema version stamp.
    pub const SYSTEM_VERSION: &'static str = "edVersion";
    /// Deprecated top-level payload key used before payloads moved to `system`.
    pub const LEGACY_PAYLOAD_KEY: &'static str = "data";
}

/// World directory layout used by the file-backed store.
pub struct PathsConfig;

impl PathsConfig {
    pub const ACTORS_DIR_NAME: &'static str = "actors";
    pub const ITEMS_DIR_NAME: &'static str = "items";
    pub const REPORTS_DIR_NAME: &'static str = "reports";
    pub const OPTIONS_FILENAME: &'static str = "migration.json";
    pub const DOCUMENT_EXTENSION: &'static str = "json";
}

/// Report presentation constants.
pub struct ReportConfig;

impl ReportConfig {
    pub const DEFAULT_TITLE: &'static str = "ED4e Migration Report";
    pub const SUMMARY_PAGE: &'static str = "Summary";
    pub const NOT_FOUND_MARKER: &'static str = "(not found)";
}

/// Options for one migration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationOptions {
    /// Keep a `.bak` copy of every document file before it is overwritten.
    pub keep_backup: bool,
    /// Run the pipeline and build the report without writing documents.
    pub dry_run: bool,
    /// Directory for report artifacts; relative paths resolve against the world.
    pub report_dir: PathBuf,
    /// Title of the first report page.
    pub report_title: String,
    /// Source system assumed when only the container layout looks legacy.
    pub fallback_source_system: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            keep_backup: true,
            dry_run: false,
            report_dir: PathBuf::from(PathsConfig::REPORTS_DIR_NAME),
            report_title: ReportConfig::DEFAULT_TITLE.to_string(),
            fallback_source_system: crate::legacy::earthdawn4e::SOURCE_SYSTEM_ID.to_string(),
        }
    }
}

impl MigrationOptions {
    /// Load options from a JSON file, or defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let options = atomic_read_json::<MigrationOptions>(path)?.unwrap_or_default();
        options.validate()?;
        Ok(options)
    }

    /// Load `migration.json` from a world directory if present.
    pub fn load_from_world(world_root: &Path) -> Result<Self> {
        Self::load(&world_root.join(PathsConfig::OPTIONS_FILENAME))
    }

    /// Resolve the report directory against the world root.
    pub fn resolved_report_dir(&self, world_root: &Path) -> PathBuf {
        if self.report_dir.is_absolute() {
            self.report_dir.clone()
        } else {
            world_root.join(&self.report_dir)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.fallback_source_system.trim().is_empty() {
            return Err(MigrationError::Config {
                message: "fallbackSourceSystem must not be empty".to_string(),
            });
        }
        if self.report_title.trim().is_empty() {
            return Err(MigrationError::Config {
                message: "reportTitle must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let options = MigrationOptions::load_from_world(temp.path()).unwrap();
        assert_eq!(options, MigrationOptions::default());
        assert_eq!(options.fallback_source_system, "earthdawn4e");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(PathsConfig::OPTIONS_FILENAME),
            r#"{ "dryRun": true, "reportDir": "/var/reports" }"#,
        )
        .unwrap();

        let options = MigrationOptions::load_from_world(temp.path()).unwrap();
        assert!(options.dry_run);
        assert!(options.keep_backup);
        assert_eq!(
            options.resolved_report_dir(temp.path()),
            PathBuf::from("/var/reports")
        );
    }

    #[test]
    fn test_empty_fallback_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("options.json");
        std::fs::write(&path, r#"{ "fallbackSourceSystem": " " }"#).unwrap();

        let err = MigrationOptions::load(&path).unwrap_err();
        assert!(matches!(err, MigrationError::Config { .. }));
    }

    #[test]
    fn test_relative_report_dir_resolves_against_world() {
        let options = MigrationOptions::default();
        let dir = options.resolved_report_dir(Path::new("/worlds/barsaive"));
        assert_eq!(dir, PathBuf::from("/worlds/barsaive/reports"));
    }
}
