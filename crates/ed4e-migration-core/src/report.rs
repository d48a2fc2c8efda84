//! Report assembly from the issue ledger.
//!
//! The host renders reports; this module only decides what goes on which
//! page. Subjects are turned into live references by looking them up in the
//! store, and degrade to plain text when the lookup fails.

use crate::config::ReportConfig;
use crate::document::{Bucket, Document};
use crate::ledger::{IssueLedger, Severity, Subject};
use crate::store::DocumentStore;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Visual style of one report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStyle {
    Error,
    Warning,
    Info,
    Success,
    Todo,
}

impl ReportStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStyle::Error => "error",
            ReportStyle::Warning => "warning",
            ReportStyle::Info => "info",
            ReportStyle::Success => "success",
            ReportStyle::Todo => "todo",
        }
    }
}

impl From<Severity> for ReportStyle {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => ReportStyle::Info,
            Severity::Warning => ReportStyle::Warning,
            Severity::Todo => ReportStyle::Todo,
            Severity::Error => ReportStyle::Error,
        }
    }
}

/// Where a committed report ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportArtifact {
    /// Host-specific location, e.g. a file path or journal id.
    pub location: String,
    pub pages: usize,
}

/// Host sink for a multi-page report.
#[async_trait]
pub trait ReportBuilder: Send {
    async fn start_page(&mut self, title: &str) -> Result<()>;

    async fn add_content(&mut self, style: ReportStyle, text: &str) -> Result<()>;

    async fn commit(&mut self) -> Result<ReportArtifact>;
}

/// Resolves subjects to live references, caching owner lookups.
struct SubjectResolver<'s> {
    store: &'s dyn DocumentStore,
    owners: HashMap<String, Option<Document>>,
}

impl<'s> SubjectResolver<'s> {
    fn new(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            owners: HashMap::new(),
        }
    }

    async fn fetch(&self, bucket: Bucket, id: &str) -> Option<Document> {
        match self.store.get(bucket, id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Report lookup of {}/{} failed: {}", bucket, id, e);
                None
            }
        }
    }

    async fn link(&mut self, subject: &Subject) -> String {
        let resolved = match &subject.owner {
            Some((owner_id, _)) => {
                if !self.owners.contains_key(owner_id) {
                    let owner = self.fetch(Bucket::Actors, owner_id).await;
                    self.owners.insert(owner_id.clone(), owner);
                }
                self.owners
                    .get(owner_id)
                    .and_then(|o| o.as_ref())
                    .and_then(|owner| owner.embedded_items().into_iter().find(|i| i.id() == subject.id))
                    .map(|item| format!("@UUID[Actor.{}.Item.{}]{{{}}}", owner_id, item.id(), item.name()))
            }
            None => match subject.bucket {
                Bucket::Actors | Bucket::Items => self
                    .fetch(subject.bucket, &subject.id)
                    .await
                    .map(|doc| format!("@UUID[{}.{}]{{{}}}", doc.kind(), doc.id(), doc.name())),
                Bucket::Unknown => None,
            },
        };
        resolved.unwrap_or_else(|| plain_label(subject))
    }
}

fn plain_label(subject: &Subject) -> String {
    let name = if subject.name.is_empty() {
        subject.id.as_str()
    } else {
        subject.name.as_str()
    };
    match &subject.owner {
        Some((_, owner_name)) => format!("{} on {} {}", name, owner_name, ReportConfig::NOT_FOUND_MARKER),
        None => format!("{} {}", name, ReportConfig::NOT_FOUND_MARKER),
    }
}

/// Write the ledger as a summary page plus one page per document type.
pub async fn assemble_report(
    ledger: &IssueLedger,
    store: &dyn DocumentStore,
    builder: &mut dyn ReportBuilder,
    title: &str,
) -> Result<ReportArtifact> {
    let successful = ledger.successful();
    let incomplete = ledger.incomplete();
    let mut resolver = SubjectResolver::new(store);

    builder
        .start_page(&format!("{} - {}", title, ReportConfig::SUMMARY_PAGE))
        .await?;
    builder
        .add_content(
            ReportStyle::Info,
            &format!("Completed {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        )
        .await?;
    builder
        .add_content(
            ReportStyle::Success,
            &format!("{} documents migrated", successful.len()),
        )
        .await?;
    if !incomplete.is_empty() {
        builder
            .add_content(
                ReportStyle::Error,
                &format!("{} documents need attention", incomplete.len()),
            )
            .await?;
        for subject in &incomplete {
            let link = resolver.link(subject).await;
            builder.add_content(ReportStyle::Error, &link).await?;
        }
    }
    for severity in [Severity::Warning, Severity::Todo] {
        let count = ledger.count(severity);
        if count > 0 {
            builder
                .add_content(severity.into(), &format!("{} {} entries", count, severity))
                .await?;
        }
    }

    let groups = ledger.grouped_by_type();
    for (doc_type, subjects) in &groups {
        let page = if doc_type.is_empty() { "untyped" } else { doc_type };
        builder.start_page(page).await?;
        for subject in subjects {
            let link = resolver.link(subject).await;
            let has_error = ledger
                .issues_for(subject)
                .any(|i| i.severity == Severity::Error);
            let style = if has_error {
                ReportStyle::Error
            } else {
                ReportStyle::Success
            };
            builder.add_content(style, &link).await?;
            for issue in ledger.issues_for(subject) {
                builder
                    .add_content(issue.severity.into(), &issue.message)
                    .await?;
            }
        }
    }

    let artifact = builder.commit().await?;
    debug!(
        "Committed report with {} pages to {}",
        artifact.pages, artifact.location
    );
    Ok(artifact)
}
