//! Filesystem-backed object store.
//!
//! A directory acts as the bucket: keys are `/`-separated relative paths,
//! blobs are files. Writes go to a temp file that is renamed into place, so
//! a reader sees either the old or the new document. Leases are JSON
//! records under `<root>/.leases/`, created with a hard link so that only
//! one caller can create a given record; an expired record may be taken
//! over by the next caller.
//!
//! Takeover of an expired lease is not atomic: two callers racing for the
//! same expired record can, in a narrow window, both believe they won.
//! Shared network filesystems also vary in hard-link and rename guarantees.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::fsutil;

use super::{LeaseId, ObjectStore};

const LEASE_DIR: &str = ".leases";
const TAKEOVER_ATTEMPTS: usize = 2;

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    lease_id: LeaseId,
    expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let key = key.trim_end_matches('/');
        let invalid = key.is_empty()
            || key.starts_with('/')
            || key.contains('\\')
            || key
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
            || key.split('/').next() == Some(LEASE_DIR);
        if invalid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn lease_path(&self, key: &str) -> PathBuf {
        let name = key.replace('%', "%25").replace('/', "%2F");
        self.root.join(LEASE_DIR).join(format!("{name}.lease"))
    }

    async fn is_file(path: &Path) -> Result<bool, StoreError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path.display(), e)),
        }
    }

    async fn is_populated_dir(path: &Path) -> Result<bool, StoreError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => fsutil::contains_files(path)
                .await
                .map_err(|e| StoreError::io(path.display(), e)),
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path.display(), e)),
        }
    }

    /// Write `content` next to `path` under a unique temp name.
    async fn write_temp(path: &Path, content: &[u8]) -> Result<PathBuf, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent.display(), e))?;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("blob");
        let tmp_path = path.with_file_name(format!(
            ".{file_name}.{:016x}.tmp",
            rand::random::<u64>()
        ));
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| StoreError::io(tmp_path.display(), e))?;
        Ok(tmp_path)
    }

    async fn read_lease(&self, key: &str) -> Result<Option<LeaseRecord>, StoreError> {
        let path = self.lease_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path.display(), e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::CorruptLease {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn remove_lease_file(&self, key: &str) -> Result<(), StoreError> {
        let path = self.lease_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path.display(), e)),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Self::is_file(&self.resolve(key)?).await
    }

    async fn read_text(&self, key: &str) -> Result<String, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                String::from_utf8(bytes).map_err(|_| StoreError::InvalidText(key.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::io(path.display(), e)),
        }
    }

    async fn write_text(&self, key: &str, content: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        let tmp_path = Self::write_temp(&path, content.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StoreError::io(path.display(), e))?;
        debug!(%key, bytes = content.len(), "blob written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if !Self::is_file(&path).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::io(path.display(), e))?;
        self.remove_lease_file(key).await
    }

    async fn acquire_lease(
        &self,
        key: &str,
        duration: Duration,
    ) -> Result<Option<LeaseId>, StoreError> {
        if !self.exists(key).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let lease_path = self.lease_path(key);

        for _ in 0..TAKEOVER_ATTEMPTS {
            let lease = LeaseId::generate();
            let expires_at = chrono::Duration::from_std(duration)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let record = serde_json::to_vec(&LeaseRecord {
                lease_id: lease.clone(),
                expires_at,
            })
            .map_err(|e| StoreError::CorruptLease {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

            let tmp_path = Self::write_temp(&lease_path, &record).await?;
            let linked = tokio::fs::hard_link(&tmp_path, &lease_path).await;
            if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
                warn!(path = %tmp_path.display(), error = %e, "failed to remove lease temp file");
            }

            match linked {
                Ok(()) => return Ok(Some(lease)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::io(lease_path.display(), e)),
            }

            match self.read_lease(key).await {
                Ok(Some(current)) if current.is_live() => return Ok(None),
                Ok(Some(_)) => debug!(%key, "taking over expired lease"),
                Ok(None) => {}
                Err(e) => warn!(%key, error = %e, "discarding unreadable lease record"),
            }
            self.remove_lease_file(key).await?;
        }

        Ok(None)
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError> {
        match self.read_lease(key).await? {
            Some(current) if current.lease_id == *lease => self.remove_lease_file(key).await,
            Some(current) if current.is_live() => Err(StoreError::LeaseLost(key.to_string())),
            _ => Ok(()),
        }
    }

    async fn directory_exists(&self, prefix: &str) -> Result<bool, StoreError> {
        Self::is_populated_dir(&self.resolve(prefix)?).await
    }

    async fn delete_directory(&self, prefix: &str) -> Result<(), StoreError> {
        let path = self.resolve(prefix)?;
        if !Self::is_populated_dir(&path).await? {
            return Err(StoreError::NotFound(prefix.to_string()));
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(path.display(), e))
    }

    async fn upload_directory(&self, local: &Path, prefix: &str) -> Result<(), StoreError> {
        let path = self.resolve(prefix)?;
        let copied = fsutil::copy_directory(local, &path)
            .await
            .map_err(|e| StoreError::io(local.display(), e))?;
        debug!(%prefix, files = copied, "directory uploaded");
        Ok(())
    }

    async fn download_directory(&self, prefix: &str, local: &Path) -> Result<(), StoreError> {
        let path = self.resolve(prefix)?;
        if !Self::is_populated_dir(&path).await? {
            return Err(StoreError::NotFound(prefix.to_string()));
        }
        let copied = fsutil::copy_directory(&path, local)
            .await
            .map_err(|e| StoreError::io(local.display(), e))?;
        debug!(%prefix, files = copied, "directory downloaded");
        Ok(())
    }
}
