//! Lease manager: single-attempt, fail-fast leases over shared documents.
//!
//! A lease is the only thing standing between two nodes rewriting the same
//! document. Acquisition is one round-trip: either the caller gets the lease
//! now or it learns someone else holds it. Nothing here waits or retries;
//! the store's lease expiry is what frees a lease whose holder died.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::storage::{LeaseId, ObjectStore};

/// A held lease on one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    resource: String,
    id: LeaseId,
}

/// Result of one acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaseAttempt {
    Acquired(Lease),
    /// Another holder owns the lease. Expected under contention.
    Held,
    /// The resource does not exist, so there is nothing to lock.
    Missing,
}

impl LeaseAttempt {
    /// The lease if acquired.
    pub fn into_lease(self) -> Option<Lease> {
        match self {
            Self::Acquired(lease) => Some(lease),
            Self::Held | Self::Missing => None,
        }
    }
}

#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn ObjectStore>,
    duration: Duration,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn ObjectStore>, duration: Duration) -> Self {
        Self { store, duration }
    }

    pub async fn try_acquire(&self, resource: &str) -> Result<LeaseAttempt, StoreError> {
        if !self.store.exists(resource).await? {
            debug!(%resource, "lease skipped, resource does not exist");
            return Ok(LeaseAttempt::Missing);
        }

        match self.store.acquire_lease(resource, self.duration).await {
            Ok(Some(id)) => {
                debug!(%resource, lease = %id, "lease acquired");
                Ok(LeaseAttempt::Acquired(Lease {
                    resource: resource.to_string(),
                    id,
                }))
            }
            Ok(None) => {
                debug!(%resource, "lease held by another node");
                Ok(LeaseAttempt::Held)
            }
            // Deleted between the probe and the acquire.
            Err(StoreError::NotFound(_)) => Ok(LeaseAttempt::Missing),
            Err(e) => Err(e),
        }
    }

    /// Release a lease; `None` is a no-op.
    pub async fn release(&self, lease: Option<Lease>) -> Result<(), StoreError> {
        let Some(lease) = lease else {
            return Ok(());
        };
        match self.store.release_lease(&lease.resource, &lease.id).await {
            Ok(()) => {
                debug!(resource = %lease.resource, lease = %lease.id, "lease released");
                Ok(())
            }
            Err(e) => {
                warn!(resource = %lease.resource, error = %e, "lease release failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    fn manager(store: &MemoryObjectStore) -> LeaseManager {
        LeaseManager::new(Arc::new(store.clone()), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn missing_resource_is_not_locked() {
        let store = MemoryObjectStore::new();
        let leases = manager(&store);

        assert_eq!(leases.try_acquire("doc.json").await.unwrap(), LeaseAttempt::Missing);
    }

    #[tokio::test]
    async fn second_attempt_sees_held() {
        let store = MemoryObjectStore::new();
        store.write_text("doc.json", "[]").await.unwrap();
        let leases = manager(&store);

        let first = leases.try_acquire("doc.json").await.unwrap().into_lease();
        assert!(first.is_some());
        assert_eq!(leases.try_acquire("doc.json").await.unwrap(), LeaseAttempt::Held);

        leases.release(first).await.unwrap();
        assert!(matches!(
            leases.try_acquire("doc.json").await.unwrap(),
            LeaseAttempt::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn releasing_none_is_noop() {
        let store = MemoryObjectStore::new();
        manager(&store).release(None).await.unwrap();
    }

    #[tokio::test]
    async fn holders_on_shared_store_exclude_each_other() {
        let store = MemoryObjectStore::new();
        store.write_text("doc.json", "[]").await.unwrap();
        let node_a = manager(&store);
        let node_b = manager(&store);

        let lease = node_a.try_acquire("doc.json").await.unwrap().into_lease();
        assert_eq!(node_b.try_acquire("doc.json").await.unwrap(), LeaseAttempt::Held);

        node_a.release(lease).await.unwrap();
        assert!(node_b.try_acquire("doc.json").await.unwrap().into_lease().is_some());
    }
}
