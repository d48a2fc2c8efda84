//! ED4e Migrate - command-line host for the migration pipeline.
//!
//! Runs every built-in legacy migration over an exported world directory
//! (`actors/*.json`, `items/*.json`), writes changed documents back in place
//! and leaves a Markdown report next to them.

mod journal;

use anyhow::{Context, Result};
use clap::Parser;
use ed4e_migration::{JsonWorldStore, MigrationOptions, MigrationOrchestrator, ReportBuilder};
use journal::MarkdownJournal;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "ed4e-migrate")]
#[command(about = "Migrate legacy ED4e actors and items to the current schema")]
struct Args {
    /// World directory containing actors/ and items/
    world: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run the migration without writing any document
    #[arg(long)]
    dry_run: bool,

    /// Options file (defaults to <world>/migration.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report directory, overriding the options file
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Don't keep .bak copies of overwritten files
    #[arg(long)]
    no_backup: bool,

    /// Skip the Markdown report
    #[arg(long)]
    no_report: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn load_options(args: &Args) -> Result<MigrationOptions> {
    let mut options = match &args.config {
        Some(path) => MigrationOptions::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => MigrationOptions::load_from_world(&args.world)
            .with_context(|| format!("Failed to load options from {}", args.world.display()))?,
    };
    if args.dry_run {
        options.dry_run = true;
    }
    if args.no_backup {
        options.keep_backup = false;
    }
    if let Some(dir) = &args.report_dir {
        options.report_dir = dir.clone();
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if !args.world.is_dir() {
        anyhow::bail!("World directory not found: {}", args.world.display());
    }
    info!("Migrating world at {}", args.world.display());

    let options = load_options(&args)?;
    let report_dir = options.resolved_report_dir(&args.world);
    let store = JsonWorldStore::new(&args.world).with_backups(options.keep_backup);
    let mut orchestrator = MigrationOrchestrator::with_builtin_systems(options)?;

    let mut journal = MarkdownJournal::new(&report_dir);
    let report = if args.no_report {
        None
    } else {
        Some(&mut journal as &mut dyn ReportBuilder)
    };
    let summary = match orchestrator.run(&store, report).await {
        Ok(summary) => summary,
        Err(e) if e.is_host_failure() => {
            return Err(anyhow::Error::new(e)
                .context(format!("Could not access world at {}", args.world.display())));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "{} documents scanned, {} changed, {} written, {} embedded items removed",
        summary.documents, summary.changed, summary.written, summary.removed_items
    );
    for (severity, count) in &summary.issues {
        if *count > 0 {
            info!("{}: {}", severity, count);
        }
    }
    if let Some(report) = &summary.report {
        info!("Report: {}", report.location);
    }
    if let Some(error) = &summary.report_error {
        warn!("Report could not be written: {}", error);
    }
    if !summary.write_failures.is_empty() {
        warn!("Failed to save: {}", summary.write_failures.join(", "));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if summary.write_failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} documents could not be saved", summary.write_failures.len())
    }
}
