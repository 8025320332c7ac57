//! Object store abstraction: the shared system of record.
//!
//! Every node talks to the same store. Documents are whole-text blobs with
//! atomic overwrite; artifact sets are directories of blobs under a key
//! prefix. Leases are the only cross-process mutual exclusion primitive and
//! always carry a store-enforced expiry.

pub mod fs;
pub mod memory;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

/// Opaque token proving ownership of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(String);

impl LeaseId {
    /// A fresh random token.
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn read_text(&self, key: &str) -> Result<String, StoreError>;

    /// Replace the blob atomically; readers never see a partial write.
    async fn write_text(&self, key: &str, content: &str) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when the blob is absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Take an exclusive lease on an existing blob.
    ///
    /// Returns `Ok(None)` when another holder's lease has not yet expired
    /// and [`StoreError::NotFound`] when the blob does not exist.
    async fn acquire_lease(&self, key: &str, duration: Duration)
        -> Result<Option<LeaseId>, StoreError>;

    /// Release a lease. Succeeds if the lease is already gone; fails with
    /// [`StoreError::LeaseLost`] if someone else now holds it.
    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<(), StoreError>;

    /// True when at least one blob lives under `prefix`.
    async fn directory_exists(&self, prefix: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing lives under `prefix`.
    async fn delete_directory(&self, prefix: &str) -> Result<(), StoreError>;

    /// Copy every file under `local` to blobs under `prefix`.
    async fn upload_directory(&self, local: &Path, prefix: &str) -> Result<(), StoreError>;

    /// Copy every blob under `prefix` into `local`, creating it as needed.
    async fn download_directory(&self, prefix: &str, local: &Path) -> Result<(), StoreError>;
}
