//! File-backed world: one JSON file per top-level document.
//!
//! ```text
//! <world>/
//!   actors/<anything>.json
//!   items/<anything>.json
//! ```
//!
//! File names are not significant; a document is found by its `_id`.

use super::atomic::{atomic_read_json, atomic_write_json};
use super::{DocumentStore, DocumentUpdate};
use crate::config::PathsConfig;
use crate::document::{Bucket, Document, DocumentKind};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use walkdir::WalkDir;

type PathIndex = HashMap<(Bucket, String), PathBuf>;

/// [`DocumentStore`] over a world directory.
#[derive(Debug, Clone)]
pub struct JsonWorldStore {
    root: PathBuf,
    keep_backup: bool,
    index: Arc<RwLock<PathIndex>>,
}

impl JsonWorldStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            keep_backup: true,
            index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Keep a `.bak` copy of each file before overwriting it.
    pub fn with_backups(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: Bucket) -> Option<PathBuf> {
        let name = match bucket {
            Bucket::Actors => PathsConfig::ACTORS_DIR_NAME,
            Bucket::Items => PathsConfig::ITEMS_DIR_NAME,
            Bucket::Unknown => return None,
        };
        Some(self.root.join(name))
    }

    fn kind_of(bucket: Bucket) -> Option<DocumentKind> {
        match bucket {
            Bucket::Actors => Some(DocumentKind::Actor),
            Bucket::Items => Some(DocumentKind::Item),
            Bucket::Unknown => None,
        }
    }

    fn remember(&self, bucket: Bucket, found: &[(PathBuf, Document)]) -> Result<()> {
        let mut index = self
            .index
            .write()
            .map_err(|e| MigrationError::Other(format!("Failed to acquire index lock: {}", e)))?;
        for (path, doc) in found {
            index.insert((bucket, doc.id().to_string()), path.clone());
        }
        Ok(())
    }

    fn cached_path(&self, bucket: Bucket, id: &str) -> Result<Option<PathBuf>> {
        let index = self
            .index
            .read()
            .map_err(|e| MigrationError::Other(format!("Failed to acquire index lock: {}", e)))?;
        Ok(index.get(&(bucket, id.to_string())).cloned())
    }

    async fn scan(&self, bucket: Bucket) -> Result<Vec<(PathBuf, Document)>> {
        let (Some(dir), Some(kind)) = (self.bucket_dir(bucket), Self::kind_of(bucket)) else {
            return Ok(Vec::new());
        };
        let found = tokio::task::spawn_blocking(move || scan_dir(&dir, kind))
            .await
            .map_err(|e| MigrationError::Store {
                message: format!("Scan task failed: {}", e),
            })??;
        self.remember(bucket, &found)?;
        Ok(found)
    }

    async fn locate(&self, bucket: Bucket, id: &str) -> Result<Option<PathBuf>> {
        if let Some(path) = self.cached_path(bucket, id)? {
            if path.exists() {
                return Ok(Some(path));
            }
        }
        let found = self.scan(bucket).await?;
        Ok(found
            .into_iter()
            .find(|(_, doc)| doc.id() == id)
            .map(|(path, _)| path))
    }
}

fn scan_dir(dir: &Path, kind: DocumentKind) -> Result<Vec<(PathBuf, Document)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext == PathsConfig::DOCUMENT_EXTENSION)
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match atomic_read_json::<Value>(&path) {
            Ok(Some(value @ Value::Object(_))) => {
                let doc = Document::new(kind, value);
                if doc.id().is_empty() {
                    warn!("Skipping {}: document has no _id", path.display());
                    continue;
                }
                documents.push((path, doc));
            }
            Ok(_) => warn!("Skipping {}: not a JSON object", path.display()),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    debug!("Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}

#[async_trait]
impl DocumentStore for JsonWorldStore {
    async fn load_all(&self, bucket: Bucket) -> Result<Vec<Document>> {
        Ok(self
            .scan(bucket)
            .await?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    async fn get(&self, bucket: Bucket, id: &str) -> Result<Option<Document>> {
        let (Some(path), Some(kind)) = (self.locate(bucket, id).await?, Self::kind_of(bucket)) else {
            return Ok(None);
        };
        let value = tokio::task::spawn_blocking(move || atomic_read_json::<Value>(&path))
            .await
            .map_err(|e| MigrationError::Store {
                message: format!("Read task failed: {}", e),
            })??;
        Ok(value.map(|v| Document::new(kind, v)))
    }

    async fn write(&self, bucket: Bucket, update: DocumentUpdate) -> Result<()> {
        let path = self
            .locate(bucket, &update.id)
            .await?
            .ok_or_else(|| MigrationError::DocumentNotFound {
                bucket: bucket.to_string(),
                id: update.id.clone(),
            })?;
        let keep_backup = self.keep_backup;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut stored = match atomic_read_json::<Value>(&path)? {
                Some(Value::Object(map)) => map,
                _ => {
                    return Err(MigrationError::Store {
                        message: format!("{} no longer holds a document", path.display()),
                    })
                }
            };
            update.apply_to(&mut stored);
            atomic_write_json(&path, &Value::Object(stored), keep_backup)
        })
        .await
        .map_err(|e| MigrationError::Store {
            message: format!("Write task failed: {}", e),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backup_path;
    use serde_json::json;
    use tempfile::TempDir;

    fn seed(root: &Path, dir: &str, file: &str, value: Value) -> PathBuf {
        let path = root.join(dir).join(file);
        atomic_write_json(&path, &value, false).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_all_skips_junk() {
        let temp_dir = TempDir::new().unwrap();
        seed(temp_dir.path(), "actors", "ardan.json", json!({ "_id": "a1", "name": "Ardan" }));
        seed(temp_dir.path(), "actors", "noid.json", json!({ "name": "Nobody" }));
        std::fs::write(temp_dir.path().join("actors").join("broken.json"), "{").unwrap();
        std::fs::write(temp_dir.path().join("actors").join("notes.txt"), "hi").unwrap();

        let store = JsonWorldStore::new(temp_dir.path());
        let actors = store.load_all(Bucket::Actors).await.unwrap();
        assert_eq!(actors.len(), 1);
        assert_eq!(actors[0].kind(), DocumentKind::Actor);
        assert!(store.load_all(Bucket::Items).await.unwrap().is_empty());
        assert!(store.load_all(Bucket::Unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_not_file_name() {
        let temp_dir = TempDir::new().unwrap();
        seed(temp_dir.path(), "items", "sword-of-doom.json", json!({ "_id": "i9", "name": "Sword" }));

        let store = JsonWorldStore::new(temp_dir.path());
        let item = store.get(Bucket::Items, "i9").await.unwrap().unwrap();
        assert_eq!(item.name(), "Sword");
        assert!(store.get(Bucket::Items, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_applies_update_with_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = seed(
            temp_dir.path(),
            "items",
            "knack.json",
            json!({ "_id": "k1", "type": "knack", "system": { "knackType": "karma" }, "sort": 3 }),
        );

        let store = JsonWorldStore::new(temp_dir.path());
        let update = DocumentUpdate {
            id: "k1".into(),
            doc_type: Some("knackKarma".into()),
            system: Some(serde_json::Map::new()),
            ..Default::default()
        };
        store.write(Bucket::Items, update).await.unwrap();

        let written: Value = atomic_read_json(&path).unwrap().unwrap();
        assert_eq!(written["type"], "knackKarma");
        assert_eq!(written["system"], json!({}));
        assert_eq!(written["sort"], 3);
        assert!(backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_missing_document_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonWorldStore::new(temp_dir.path()).with_backups(false);
        let err = store
            .write(Bucket::Actors, DocumentUpdate { id: "ghost".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::DocumentNotFound { .. }));
    }
}
