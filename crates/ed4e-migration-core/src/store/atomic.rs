//! Crash-safe JSON persistence for world documents.
//!
//! A write goes to a sibling temp file first, is synced to disk, and then
//! renamed over the target. Readers never observe a half-written document.

use crate::{MigrationError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MigrationError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| MigrationError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Backup path for a document file: `x.json` → `x.json.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".{}.{}.tmp",
        process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

/// Write `data` as pretty JSON, atomically.
///
/// When `keep_backup` is set and the target already exists, it is copied to
/// [`backup_path`] first. A failed backup is logged and does not stop the
/// write.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MigrationError::io_with_path(e, parent))?;
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| MigrationError::Json {
        message: format!("Failed to serialize {}: {}", path.display(), e),
        source: Some(e),
    })?;

    let temp = temp_path(path);
    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp)
        .and_then(|mut file| {
            file.write_all(serialized.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(MigrationError::io_with_path(e, &temp));
    }

    if keep_backup && path.exists() {
        let backup = backup_path(path);
        match fs::copy(path, &backup) {
            Ok(_) => debug!("Created backup: {}", backup.display()),
            Err(e) => warn!("Failed to create backup {}: {}", backup.display(), e),
        }
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(MigrationError::io_with_path(e, path));
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}
