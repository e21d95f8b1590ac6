//! File-per-document backend for local deployments
//!
//! Layout: `<root>/<collection>/<id>.json`. Writes go through a temp file
//! and rename so a reader never observes a torn document. A process-wide
//! write lock makes batches atomic with respect to in-process readers.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BackendError, BackendResult, BatchWrite, DocumentBackend};

pub struct FileBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Open or create a file backend rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(?root, "opened file backend");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn doc_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{}.json", id))
    }

    fn write_doc(&self, collection: &str, id: &str, doc: &Value) -> BackendResult<()> {
        let path = self.doc_path(collection, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(doc).expect("json value serializes"))?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_doc(&self, collection: &str, id: &str) -> BackendResult<Option<Value>> {
        let path = self.doc_path(collection, id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|source| BackendError::Malformed {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl DocumentBackend for FileBackend {
    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Value>> {
        self.read_doc(collection, id)
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_doc(collection, id, &doc)
    }

    async fn batch(&self, writes: Vec<BatchWrite>) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        for w in &writes {
            self.write_doc(w.collection, &w.id, &w.doc)?;
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> BackendResult<Vec<(String, Value)>> {
        let dir = self.root.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && let Some(id) = path.file_stem().and_then(|s| s.to_str())
                && let Some(doc) = self.read_doc(collection, id)?
            {
                docs.push((id.to_string(), doc));
            }
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        assert!(backend.get("chunks", "chunk_0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        backend.set("chunks", "chunk_0", json!({"text": "abc"})).await.unwrap();
        let doc = backend.get("chunks", "chunk_0").await.unwrap().unwrap();
        assert_eq!(doc["text"], "abc");
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let backend = FileBackend::open(temp.path()).unwrap();
            backend.set("meta", "cursor", json!({"index": 99})).await.unwrap();
        }

        let backend = FileBackend::open(temp.path()).unwrap();
        let doc = backend.get("meta", "cursor").await.unwrap().unwrap();
        assert_eq!(doc["index"], 99);
    }

    #[tokio::test]
    async fn test_batch_and_list() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();

        backend
            .batch(vec![
                BatchWrite::new("words", "word_0_3", json!({"word": "cat", "start": 0, "len": 3})),
                BatchWrite::new("words", "word_5_4", json!({"word": "dogs", "start": 5, "len": 4})),
            ])
            .await
            .unwrap();

        let mut ids: Vec<String> = backend.list("words").await.unwrap().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec!["word_0_3", "word_5_4"]);
    }
}
