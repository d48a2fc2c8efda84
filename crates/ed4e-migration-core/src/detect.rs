//! Source-system detection from document structure.
//!
//! Legacy data carries no explicit schema tag, so the detector classifies a
//! document from its stamps first and its shape second:
//!
//! 1. current version stamp → already current
//! 2. other version stamp → no-op (inter-version upgrades are not implemented)
//! 3. legacy "migrated" marker without a version → no-op
//! 4. legacy-only field names inside `system` → that legacy system
//! 5. deprecated top-level `data` payload → fallback legacy system
//! 6. otherwise → unrecognized
//!
//! Stamps are always consulted before shape. A migrated document may still
//! contain fields that look legacy, and must never be picked up again.

use crate::config::MigrationConfig;
use crate::document::{Document, DocumentKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Name of a legacy schema family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSystem(String);

impl SourceSystem {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceSystem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Field names that only a given legacy schema ever wrote into `system`.
#[derive(Debug, Clone)]
pub struct StructuralSignature {
    pub source_system: SourceSystem,
    pub kind: DocumentKind,
    pub fields: Vec<&'static str>,
}

impl StructuralSignature {
    pub fn new(source_system: SourceSystem, kind: DocumentKind, fields: &[&'static str]) -> Self {
        Self {
            source_system,
            kind,
            fields: fields.to_vec(),
        }
    }

    fn matching_field(&self, document: &Document) -> Option<&'static str> {
        if document.kind() != self.kind {
            return None;
        }
        let system = document.system()?;
        self.fields.iter().copied().find(|f| system.contains_key(*f))
    }
}

/// What pointed the detector at a legacy system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "camelCase")]
pub enum Evidence {
    /// A legacy-only field was found in `system`.
    Signature(String),
    /// The payload still lives under the deprecated top-level key.
    ContainerLayout,
}

/// Classification of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Stamped with the current target version.
    Current,
    /// Stamped with a different version and no upgrade path exists.
    OtherVersion { found: String },
    /// Marked as migrated by an old script that wrote no version.
    AlreadyMigrated,
    /// Authored under a legacy schema.
    Legacy {
        system: SourceSystem,
        evidence: Evidence,
    },
    /// Nothing identifies the document as legacy.
    Unrecognized,
}

impl Detection {
    /// The legacy system to migrate from, if migration is needed.
    pub fn source_system(&self) -> Option<&SourceSystem> {
        match self {
            Detection::Legacy { system, .. } => Some(system),
            _ => None,
        }
    }

    pub fn needs_migration(&self) -> bool {
        self.source_system().is_some()
    }
}

/// Structural classifier. Pure: detection never mutates the document.
#[derive(Debug, Clone)]
pub struct Detector {
    target_version: semver::Version,
    signatures: Vec<StructuralSignature>,
    fallback: Option<SourceSystem>,
}

impl Detector {
    /// Create a detector for the given target schema version.
    ///
    /// Falls back to [`MigrationConfig::TARGET_SCHEMA_VERSION`] if the
    /// version string doesn't parse.
    pub fn new(target_version: &str) -> Self {
        let target_version = semver::Version::parse(target_version).unwrap_or_else(|_| {
            semver::Version::parse(MigrationConfig::TARGET_SCHEMA_VERSION)
                .unwrap_or_else(|_| semver::Version::new(1, 0, 0))
        });
        Self {
            target_version,
            signatures: Vec::new(),
            fallback: None,
        }
    }

    /// Add structural signatures. Earlier signatures take priority.
    pub fn with_signatures(mut self, signatures: impl IntoIterator<Item = StructuralSignature>) -> Self {
        self.signatures.extend(signatures);
        self
    }

    /// Source system assumed when only the container layout is legacy.
    pub fn with_fallback(mut self, source_system: SourceSystem) -> Self {
        self.fallback = Some(source_system);
        self
    }

    pub fn add_signature(&mut self, signature: StructuralSignature) {
        self.signatures.push(signature);
    }

    /// Classify a document.
    pub fn detect(&self, document: &Document) -> Detection {
        if let Some(stamp) = document.version_stamp() {
            return match semver::Version::parse(stamp.trim()) {
                Ok(found) if found == self.target_version => Detection::Current,
                _ => {
                    debug!(
                        "{} stamped with {}, no upgrade to {} registered; skipping",
                        document.label(),
                        stamp,
                        self.target_version
                    );
                    Detection::OtherVersion {
                        found: stamp.to_string(),
                    }
                }
            };
        }

        if document.has_legacy_marker() {
            return Detection::AlreadyMigrated;
        }

        // Container first: a legacy `data` payload hides the signature fields.
        let lifted;
        let probe = if document.has_legacy_container() && document.system().is_none() {
            let mut copy = document.clone();
            copy.lift_legacy_container();
            lifted = copy;
            &lifted
        } else {
            document
        };

        for signature in &self.signatures {
            if let Some(field) = signature.matching_field(probe) {
                return Detection::Legacy {
                    system: signature.source_system.clone(),
                    evidence: Evidence::Signature(field.to_string()),
                };
            }
        }

        if document.has_legacy_container() {
            if let Some(system) = &self.fallback {
                return Detection::Legacy {
                    system: system.clone(),
                    evidence: Evidence::ContainerLayout,
                };
            }
        }

        Detection::Unrecognized
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(MigrationConfig::TARGET_SCHEMA_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detector() -> Detector {
        Detector::new("1.0.0")
            .with_signatures([
                StructuralSignature::new("legacy-a".into(), DocumentKind::Actor, &["dexterityvalue"]),
                StructuralSignature::new("legacy-a".into(), DocumentKind::Item, &["ranks"]),
            ])
            .with_fallback("legacy-a".into())
    }

    fn item(value: serde_json::Value) -> Document {
        Document::new(DocumentKind::Item, value)
    }

    #[test]
    fn test_signature_match() {
        let detection = detector().detect(&item(json!({ "system": { "ranks": 3 } })));
        assert_eq!(
            detection,
            Detection::Legacy {
                system: "legacy-a".into(),
                evidence: Evidence::Signature("ranks".into()),
            }
        );
    }

    #[test]
    fn test_current_stamp_wins_over_signature() {
        let doc = item(json!({ "system": { "ranks": 3, "edVersion": "1.0.0" } }));
        assert_eq!(detector().detect(&doc), Detection::Current);
    }

    #[test]
    fn test_flag_stamp_is_honoured() {
        let doc = item(json!({
            "system": { "ranks": 3 },
            "flags": { "ed4e": { "migrationVersion": "1.0.0" } }
        }));
        assert_eq!(detector().detect(&doc), Detection::Current);
    }

    #[test]
    fn test_other_version_is_noop() {
        let doc = item(json!({ "system": { "ranks": 3, "edVersion": "0.8.2" } }));
        let detection = detector().detect(&doc);
        assert_eq!(
            detection,
            Detection::OtherVersion {
                found: "0.8.2".into()
            }
        );
        assert!(!detection.needs_migration());
    }

    #[test]
    fn test_unparseable_stamp_counts_as_other_version() {
        let doc = item(json!({ "system": { "edVersion": "next" } }));
        assert!(matches!(
            detector().detect(&doc),
            Detection::OtherVersion { .. }
        ));
    }

    #[test]
    fn test_legacy_marker_without_version() {
        let doc = item(json!({ "system": { "ranks": 1 }, "flags": { "ed4e": { "migrated": true } } }));
        assert_eq!(detector().detect(&doc), Detection::AlreadyMigrated);
    }

    #[test]
    fn test_signature_kind_must_match() {
        let actor = Document::new(DocumentKind::Actor, json!({ "system": { "ranks": 1 } }));
        assert_eq!(detector().detect(&actor), Detection::Unrecognized);
    }

    #[test]
    fn test_signature_inside_legacy_container() {
        let doc = item(json!({ "data": { "ranks": 2 } }));
        assert_eq!(
            detector().detect(&doc),
            Detection::Legacy {
                system: "legacy-a".into(),
                evidence: Evidence::Signature("ranks".into()),
            }
        );
        // Detection is pure.
        assert!(doc.has_legacy_container());
    }

    #[test]
    fn test_container_layout_fallback() {
        let doc = item(json!({ "data": { "weight": 1 } }));
        assert_eq!(
            detector().detect(&doc),
            Detection::Legacy {
                system: "legacy-a".into(),
                evidence: Evidence::ContainerLayout,
            }
        );
    }

    #[test]
    fn test_container_layout_without_fallback() {
        let detector = Detector::new("1.0.0");
        let doc = item(json!({ "data": { "weight": 1 } }));
        assert_eq!(detector.detect(&doc), Detection::Unrecognized);
    }

    #[test]
    fn test_current_document_is_unrecognized() {
        let doc = item(json!({ "system": { "level": 3 } }));
        assert_eq!(detector().detect(&doc), Detection::Unrecognized);
    }
}
