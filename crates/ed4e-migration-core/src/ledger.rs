//! Append-only record of per-document migration outcomes.
//!
//! Every migrator reports through an [`IssueSink`], which pre-fills the
//! subject and only allows appending. The orchestrator owns the
//! [`IssueLedger`] for one batch and clears it after the report is committed.

use crate::document::{Bucket, Document};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// How serious a migration outcome is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Non-breaking note, e.g. a field was auto-converted.
    Info,
    /// Ambiguous outcome that needs review.
    Warning,
    /// Needs manual follow-up; a placeholder was used.
    Todo,
    /// Data integrity problem; an item was removed or left invalid.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Todo => "todo",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The document an issue is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub doc_type: String,
    pub name: String,
    pub bucket: Bucket,
    /// Owning actor `(id, name)` for embedded items.
    pub owner: Option<(String, String)>,
}

impl Subject {
    pub fn of(document: &Document) -> Self {
        Self {
            id: document.id().to_string(),
            doc_type: document.doc_type().to_string(),
            name: document.name().to_string(),
            bucket: document.kind().bucket(),
            owner: None,
        }
    }

    pub fn embedded_in(document: &Document, owner: &Document) -> Self {
        Self {
            owner: Some((owner.id().to_string(), owner.name().to_string())),
            ..Self::of(document)
        }
    }

    /// Identity used to group issues: the same id under another owner is a
    /// different subject.
    fn key(&self) -> (&str, Option<&str>) {
        (
            self.id.as_str(),
            self.owner.as_ref().map(|(id, _)| id.as_str()),
        )
    }
}

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationIssue {
    pub severity: Severity,
    pub subject: Subject,
    pub message: String,
    pub detail: Value,
}

/// Per-batch issue ledger.
#[derive(Debug, Default)]
pub struct IssueLedger {
    issues: Vec<MigrationIssue>,
}

impl IssueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        severity: Severity,
        subject: Subject,
        message: impl Into<String>,
        detail: Value,
    ) {
        self.issues.push(MigrationIssue {
            severity,
            subject,
            message: message.into(),
            detail,
        });
    }

    /// Sink that appends issues about `subject`.
    pub fn sink(&mut self, subject: Subject) -> IssueSink<'_> {
        IssueSink {
            ledger: self,
            subject,
        }
    }

    pub fn issues(&self) -> &[MigrationIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Distinct subjects in first-recorded order.
    ///
    /// Each subject is returned as it was last recorded, so a document whose
    /// type changed mid-pipeline is listed under its final type.
    pub fn subjects(&self) -> Vec<&Subject> {
        let mut seen: Vec<&Subject> = Vec::new();
        for issue in &self.issues {
            match seen.iter_mut().find(|s| s.key() == issue.subject.key()) {
                Some(slot) => *slot = &issue.subject,
                None => seen.push(&issue.subject),
            }
        }
        seen
    }

    /// Issues recorded for one subject, in order.
    pub fn issues_for<'a>(&'a self, subject: &'a Subject) -> impl Iterator<Item = &'a MigrationIssue> + 'a {
        self.issues
            .iter()
            .filter(move |i| i.subject.key() == subject.key())
    }

    fn has_error(&self, subject: &Subject) -> bool {
        self.issues_for(subject)
            .any(|i| i.severity == Severity::Error)
    }

    /// Subjects without any `error` entry.
    pub fn successful(&self) -> Vec<&Subject> {
        self.subjects()
            .into_iter()
            .filter(|s| !self.has_error(s))
            .collect()
    }

    /// Subjects with at least one `error` entry.
    pub fn incomplete(&self) -> Vec<&Subject> {
        self.subjects()
            .into_iter()
            .filter(|s| self.has_error(s))
            .collect()
    }

    /// Subjects grouped by document type, groups and members in first-seen order.
    pub fn grouped_by_type(&self) -> Vec<(String, Vec<&Subject>)> {
        let mut groups: Vec<(String, Vec<&Subject>)> = Vec::new();
        for subject in self.subjects() {
            match groups.iter_mut().find(|(t, _)| *t == subject.doc_type) {
                Some((_, members)) => members.push(subject),
                None => groups.push((subject.doc_type.clone(), vec![subject])),
            }
        }
        groups
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }
}

/// Append-only handle scoped to one subject.
pub struct IssueSink<'a> {
    ledger: &'a mut IssueLedger,
    subject: Subject,
}

impl IssueSink<'_> {
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Keep the subject in step with a type change made mid-pipeline.
    pub fn retype(&mut self, doc_type: &str) {
        self.subject.doc_type = doc_type.to_string();
    }

    pub fn record(&mut self, severity: Severity, message: impl Into<String>, detail: Value) {
        self.ledger
            .record(severity, self.subject.clone(), message, detail);
    }

    pub fn info(&mut self, message: impl Into<String>, detail: Value) {
        self.record(Severity::Info, message, detail);
    }

    pub fn warning(&mut self, message: impl Into<String>, detail: Value) {
        self.record(Severity::Warning, message, detail);
    }

    pub fn todo(&mut self, message: impl Into<String>, detail: Value) {
        self.record(Severity::Todo, message, detail);
    }

    pub fn error(&mut self, message: impl Into<String>, detail: Value) {
        self.record(Severity::Error, message, detail);
    }
}
