use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::fsutil;

use super::{LeaseId, ObjectStore};

#[derive(Debug, Clone)]
struct LeaseEntry {
    lease: LeaseId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    blobs: BTreeMap<String, Vec<u8>>,
    leases: HashMap<String, LeaseEntry>,
}

/// Process-local object store. Clones share the same contents, so several
/// repositories built on clones behave like nodes sharing one bucket.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.blobs.keys().cloned().collect()
    }
}

fn dir_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.blobs.contains_key(key))
    }

    async fn read_text(&self, key: &str) -> Result<String, StoreError> {
        let state = self.state.lock().await;
        let bytes = state
            .blobs
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        String::from_utf8(bytes.clone()).map_err(|_| StoreError::InvalidText(key.to_string()))
    }

    async fn write_text(&self, key: &str, content: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.blobs.insert(key.to_string(), content.as_bytes().to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .blobs
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        state.leases.remove(key);
        Ok(())
    }

    async fn acquire_lease(
        &self,
        key: &str,
        duration: Duration,
    ) -> Result<Option<LeaseId>, StoreError> {
        let mut state = self.state.lock().await;
        if !state.blobs.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let now = Instant::now();
        if let Some(entry) = state.leases.get(key) {
            if entry.expires_at > now {
                return Ok(None);
            }
        }

        let lease = LeaseId::generate();
        state.leases.insert(
            key.to_string(),
            LeaseEntry {
                lease: lease.clone(),
                expires_at: now + duration,
            },
        );
        Ok(Some(lease))
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let (owned, live) = match state.leases.get(key) {
            Some(entry) => (entry.lease == *lease, entry.expires_at > Instant::now()),
            None => return Ok(()),
        };
        if owned {
            state.leases.remove(key);
            Ok(())
        } else if live {
            Err(StoreError::LeaseLost(key.to_string()))
        } else {
            Ok(())
        }
    }

    async fn directory_exists(&self, prefix: &str) -> Result<bool, StoreError> {
        let prefix = dir_prefix(prefix);
        let state = self.state.lock().await;
        Ok(state
            .blobs
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix)))
    }

    async fn delete_directory(&self, prefix: &str) -> Result<(), StoreError> {
        let dir = dir_prefix(prefix);
        let mut state = self.state.lock().await;
        let before = state.blobs.len();
        state.blobs.retain(|k, _| !k.starts_with(&dir));
        if state.blobs.len() == before {
            return Err(StoreError::NotFound(prefix.to_string()));
        }
        Ok(())
    }

    async fn upload_directory(&self, local: &Path, prefix: &str) -> Result<(), StoreError> {
        let dir = dir_prefix(prefix);
        let mut uploads = Vec::new();
        for file in fsutil::list_files(local)
            .await
            .map_err(|e| StoreError::io(local.display(), e))?
        {
            let relative = fsutil::relative_key(local, &file)
                .ok_or_else(|| StoreError::InvalidKey(file.display().to_string()))?;
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| StoreError::io(file.display(), e))?;
            uploads.push((format!("{dir}{relative}"), bytes));
        }

        let mut state = self.state.lock().await;
        state.blobs.extend(uploads);
        Ok(())
    }

    async fn download_directory(&self, prefix: &str, local: &Path) -> Result<(), StoreError> {
        let dir = dir_prefix(prefix);
        let files: Vec<(String, Vec<u8>)> = {
            let state = self.state.lock().await;
            state
                .blobs
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(&dir).map(|rel| (rel.to_string(), v.clone())))
                .collect()
        };
        if files.is_empty() {
            return Err(StoreError::NotFound(prefix.to_string()));
        }

        for (relative, bytes) in files {
            let target = local.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(parent.display(), e))?;
            }
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|e| StoreError::io(target.display(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_basic_operations() {
        let store = MemoryObjectStore::new();

        assert!(!store.exists("doc.json").await.unwrap());
        store.write_text("doc.json", "[]").await.unwrap();
        assert!(store.exists("doc.json").await.unwrap());
        assert_eq!(store.read_text("doc.json").await.unwrap(), "[]");

        store.delete("doc.json").await.unwrap();
        assert!(matches!(
            store.delete("doc.json").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lease_requires_existing_blob() {
        let store = MemoryObjectStore::new();
        let result = store.acquire_lease("doc.json", Duration::from_secs(10)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let store = MemoryObjectStore::new();
        store.write_text("doc.json", "[]").await.unwrap();

        let lease = store
            .acquire_lease("doc.json", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .acquire_lease("doc.json", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());

        store.release_lease("doc.json", &lease).await.unwrap();
        store.release_lease("doc.json", &lease).await.unwrap();

        assert!(store
            .acquire_lease("doc.json", Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn lease_expires() {
        let store = MemoryObjectStore::new();
        store.write_text("doc.json", "[]").await.unwrap();

        let stale = store
            .acquire_lease("doc.json", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        let fresh = store
            .acquire_lease("doc.json", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale, fresh);
        assert!(matches!(
            store.release_lease("doc.json", &stale).await,
            Err(StoreError::LeaseLost(_))
        ));
    }

    #[tokio::test]
    async fn directory_round_trip() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("lib")).unwrap();
        std::fs::write(src.path().join("app.exe"), "main").unwrap();
        std::fs::write(src.path().join("lib/dep.dll"), "dep").unwrap();

        let store = MemoryObjectStore::new();
        assert!(!store.directory_exists("svc-a/1.0.0").await.unwrap());

        store.upload_directory(src.path(), "svc-a/1.0.0").await.unwrap();
        assert!(store.directory_exists("svc-a/1.0.0").await.unwrap());
        assert!(!store.directory_exists("svc-a/1.0").await.unwrap());
        assert_eq!(
            store.keys().await,
            vec!["svc-a/1.0.0/app.exe", "svc-a/1.0.0/lib/dep.dll"]
        );

        let dst = tempfile::tempdir().unwrap();
        store
            .download_directory("svc-a/1.0.0", &dst.path().join("out"))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dst.path().join("out/lib/dep.dll")).unwrap(),
            "dep"
        );

        store.delete_directory("svc-a/1.0.0").await.unwrap();
        assert!(!store.directory_exists("svc-a/1.0.0").await.unwrap());
        assert!(matches!(
            store.delete_directory("svc-a/1.0.0").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
