//! Markdown report host for the command-line runner.
//!
//! Pages are buffered in memory and written as one Markdown file on commit.

use async_trait::async_trait;
use chrono::Local;
use ed4e_migration::{MigrationError, ReportArtifact, ReportBuilder, ReportStyle, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

struct Page {
    title: String,
    lines: Vec<(ReportStyle, String)>,
}

/// [`ReportBuilder`] that writes `migration-<timestamp>.md` into a directory.
pub struct MarkdownJournal {
    dir: PathBuf,
    pages: Vec<Page>,
}

impl MarkdownJournal {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            pages: Vec::new(),
        }
    }

    fn marker(style: ReportStyle) -> &'static str {
        match style {
            ReportStyle::Error => "**ERROR**",
            ReportStyle::Warning => "**WARNING**",
            ReportStyle::Todo => "**TODO**",
            ReportStyle::Success => "OK",
            ReportStyle::Info => "-",
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (index, page) in self.pages.iter().enumerate() {
            let heading = if index == 0 { "#" } else { "##" };
            let _ = writeln!(out, "{} {}\n", heading, page.title);
            for (style, text) in &page.lines {
                let _ = writeln!(out, "- {} {}", Self::marker(*style), text);
            }
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl ReportBuilder for MarkdownJournal {
    async fn start_page(&mut self, title: &str) -> Result<()> {
        self.pages.push(Page {
            title: title.to_string(),
            lines: Vec::new(),
        });
        Ok(())
    }

    async fn add_content(&mut self, style: ReportStyle, text: &str) -> Result<()> {
        let page = self.pages.last_mut().ok_or_else(|| MigrationError::Report {
            message: "content added before any page was started".to_string(),
        })?;
        page.lines.push((style, text.to_string()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<ReportArtifact> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MigrationError::io_with_path(e, &self.dir))?;

        let file_name = format!("migration-{}.md", Local::now().format("%Y%m%d-%H%M%S"));
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, self.render())
            .await
            .map_err(|e| MigrationError::io_with_path(e, &path))?;
        debug!("Wrote {} report pages to {}", self.pages.len(), path.display());

        Ok(ReportArtifact {
            location: path.display().to_string(),
            pages: self.pages.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_commit_writes_markdown() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("reports");
        let mut journal = MarkdownJournal::new(&dir);

        journal.start_page("Report - Summary").await.unwrap();
        journal
            .add_content(ReportStyle::Success, "2 documents migrated")
            .await
            .unwrap();
        journal.start_page("talent").await.unwrap();
        journal
            .add_content(ReportStyle::Error, "Riposte on Ardan (not found)")
            .await
            .unwrap();

        let artifact = journal.commit().await.unwrap();
        assert_eq!(artifact.pages, 2);

        let written = std::fs::read_to_string(&artifact.location).unwrap();
        assert!(written.starts_with("# Report - Summary\n"));
        assert!(written.contains("- OK 2 documents migrated"));
        assert!(written.contains("## talent"));
        assert!(written.contains("- **ERROR** Riposte on Ardan (not found)"));
    }

    #[tokio::test]
    async fn test_content_without_page_fails() {
        let temp = TempDir::new().unwrap();
        let mut journal = MarkdownJournal::new(temp.path());
        let result = journal.add_content(ReportStyle::Info, "orphan line").await;
        assert!(matches!(result, Err(MigrationError::Report { .. })));
    }
}
