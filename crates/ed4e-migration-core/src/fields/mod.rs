//! Per-field normalizers.
//!
//! A field migrator takes scoped access to one `system` record, converges one
//! field to its canonical shape, and never fails: corrupt legacy values are
//! coerced to a safe default. Running a migrator on an already-canonical
//! record is a no-op.

mod numeric;
mod text;
mod vocabulary;

pub use numeric::{coerce_non_negative, NumericFieldMigrator};
pub use text::{DescriptionMigrator, LevelMigrator};
pub use vocabulary::{ActionMigrator, AttributeMigrator, ACTIONS, ATTRIBUTES};

use crate::ledger::{IssueSink, Severity};
use serde_json::{Map, Value};

/// Something a field migrator wants recorded about its conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNote {
    pub severity: Severity,
    pub message: String,
    pub detail: Value,
}

impl FieldNote {
    pub fn info(message: impl Into<String>, detail: Value) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            detail,
        }
    }

    pub fn warning(message: impl Into<String>, detail: Value) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            detail,
        }
    }
}

/// Stateless, idempotent normalizer for one `system` field.
pub trait FieldMigrator: Send + Sync {
    /// Canonical field name this migrator owns.
    fn field(&self) -> &'static str;

    /// Converge the field in place. Returns a note only when something changed.
    fn migrate(&self, system: &mut Map<String, Value>) -> Option<FieldNote>;
}

/// Run a chain of field migrators over `system`, forwarding notes to the sink.
///
/// Returns the number of fields that changed.
pub fn run_chain(
    chain: &[&dyn FieldMigrator],
    system: &mut Map<String, Value>,
    sink: &mut IssueSink<'_>,
) -> usize {
    let mut changed = 0;
    for migrator in chain {
        if let Some(note) = migrator.migrate(system) {
            changed += 1;
            sink.record(note.severity, note.message, note.detail);
        }
    }
    changed
}

pub static WEIGHT: NumericFieldMigrator = NumericFieldMigrator::new("weight", &[]);
pub static PRICE: NumericFieldMigrator = NumericFieldMigrator::new("price", &["cost"]);
pub static DESCRIPTION: DescriptionMigrator = DescriptionMigrator;
pub static LEVEL: LevelMigrator = LevelMigrator;
pub static ATTRIBUTE: AttributeMigrator = AttributeMigrator;
pub static ACTION: ActionMigrator = ActionMigrator;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, DocumentKind};
    use crate::ledger::{IssueLedger, Subject};
    use serde_json::json;

    #[test]
    fn test_chain_records_notes() {
        let doc = Document::new(DocumentKind::Item, json!({ "_id": "i", "type": "weapon" }));
        let mut system = json!({ "weight": "2,5", "description": "Sharp." })
            .as_object()
            .cloned()
            .unwrap();
        let mut ledger = IssueLedger::new();

        let changed = {
            let mut sink = ledger.sink(Subject::of(&doc));
            run_chain(&[&WEIGHT, &PRICE, &DESCRIPTION], &mut system, &mut sink)
        };

        assert_eq!(changed, 3);
        assert_eq!(ledger.len(), 3);
        assert_eq!(system["weight"], json!({ "value": 2.5 }));
        assert_eq!(system["price"], json!({ "value": 0.0 }));
        assert_eq!(system["description"], json!({ "value": "Sharp." }));

        let mut sink = ledger.sink(Subject::of(&doc));
        assert_eq!(
            run_chain(&[&WEIGHT, &PRICE, &DESCRIPTION], &mut system, &mut sink),
            0
        );
    }
}
