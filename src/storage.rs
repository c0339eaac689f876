use crate::common::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Durable object storage for progress blobs, master dataset snapshots, and
/// ad-hoc input files. Keys are slash-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    /// `Ok(None)` means the object does not exist; errors are reserved for
    /// storage being unreachable.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Full overwrite of the object at `key`.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed store rooted at the configured data directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).exists())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        debug!(key, bytes = bytes.len(), "Wrote object");
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trips_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        assert!(!store.exists("exports/maps_master.json").await.unwrap());
        assert_eq!(store.get("exports/maps_master.json").await.unwrap(), None);

        store.put("exports/maps_master.json", b"[]").await.unwrap();
        assert!(store.exists("exports/maps_master.json").await.unwrap());
        assert_eq!(
            store.get("exports/maps_master.json").await.unwrap(),
            Some(b"[]".to_vec())
        );

        // full overwrite
        store.put("exports/maps_master.json", b"[1]").await.unwrap();
        assert_eq!(
            store.get("exports/maps_master.json").await.unwrap(),
            Some(b"[1]".to_vec())
        );
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryObjectStore::new();
        store.put("state/x.json", b"{}").await.unwrap();
        assert!(store.exists("state/x.json").await.unwrap());
        assert_eq!(store.get("state/x.json").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
