use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use vowplan_core::WriteMode;

use crate::store::{Collection, DocKey, DocumentStore, StoreError, Subscription, Watchers, apply_put};

/// Sanitizes a document key for use as a file name.
///
/// Keeps ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        return "anonymous".to_string();
    }
    sanitized
}

/// JSON-on-disk document store.
///
/// Directory layout:
/// ```text
/// <root>/
///   weddings/<key>.json
///   proposals/<key>.json
///   simulations/<key>.json
/// ```
pub struct FileStore {
    root: PathBuf,
    watchers: Watchers,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            watchers: Watchers::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn doc_path(&self, collection: Collection, key: &str) -> PathBuf {
        self.root
            .join(collection.name())
            .join(format!("{}.json", sanitize_key(key)))
    }

    async fn read_doc(path: &Path) -> Result<Option<Value>> {
        let read = tokio::fs::read_to_string(path).await;
        Self::parse_doc(path, read)
    }

    /// Blocking read for the first snapshot handed out by `subscribe`.
    fn read_doc_blocking(path: &Path) -> Result<Option<Value>> {
        Self::parse_doc(path, std::fs::read_to_string(path))
    }

    fn parse_doc(path: &Path, read: std::io::Result<String>) -> Result<Option<Value>> {
        let data = match read {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let value = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn write_doc(path: &Path, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create collection directory")?;
        }
        let json = serde_json::to_string_pretty(doc).context("Failed to serialize document")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .context("Failed to write document")?;
        tokio::fs::rename(&tmp, path)
            .await
            .context("Failed to move document into place")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Self::read_doc(&self.doc_path(collection, key)).await.map_err(|e| StoreError::ReadFailure {
            doc: DocKey::new(collection, key),
            reason: format!("{:#}", e),
        })
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        doc: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let doc_key = DocKey::new(collection, key);
        let path = self.doc_path(collection, key);
        let failure = |e: anyhow::Error| StoreError::PersistenceFailure {
            doc: doc_key.clone(),
            reason: format!("{:#}", e),
        };

        let stored = match mode {
            WriteMode::Replace => None,
            WriteMode::Merge => Self::read_doc(&path).await.map_err(failure)?,
        };
        let next = apply_put(&doc_key, stored, doc, mode)?;
        Self::write_doc(&path, &next).await.map_err(failure)?;

        debug!("Wrote {} to {}", doc_key, path.display());
        self.watchers.publish(&doc_key, Value::Object(next));
        Ok(())
    }

    fn subscribe(&self, collection: Collection, key: &str) -> Subscription {
        let path = self.doc_path(collection, key);
        self.watchers.subscribe(DocKey::new(collection, key), || {
            Self::read_doc_blocking(&path).ok().flatten()
        })
    }
}
