//! Deployment repository: config, status, and binaries in the shared store.
//!
//! Two documents live at the root of the store: the deployment config and
//! the deployment status. Both are rewritten under a lease, but they fail
//! differently:
//!
//! - Config writes are explicit operator actions. Contention surfaces as
//!   [`DepotError::ConfigLocked`] and every error reaches the caller.
//! - Status writes are heartbeats that every node repeats on a timer.
//!   [`DeploymentRepository::update_status_atomically`] never returns an
//!   error: a contended or failed round is logged and the next round
//!   overwrites with current truth.
//!
//! Binaries live under `{app_id}/{version}` and are not locked.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::domain::{
    AppIdentity, ConflictResolutionMode, DeploymentConfig, DeploymentStatus, DocumentSerializer,
    JsonStatusSerializer, RawConfigSerializer,
};
use crate::error::DepotError;
use crate::fsutil;
use crate::lease::{Lease, LeaseAttempt, LeaseManager};
use crate::storage::ObjectStore;

/// What happened to one atomic status update round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was applied and published.
    Applied,
    /// Another node held the status lease; nothing was written.
    Skipped,
    /// Reading, updating or writing failed; the error was logged.
    Failed,
}

pub struct DeploymentRepository {
    store: Arc<dyn ObjectStore>,
    leases: LeaseManager,
    config_serializer: Arc<dyn DocumentSerializer<DeploymentConfig>>,
    status_serializer: Arc<dyn DocumentSerializer<DeploymentStatus>>,
    config_key: String,
    status_key: String,
}

impl DeploymentRepository {
    pub fn new(store: Arc<dyn ObjectStore>, settings: &RepositoryConfig) -> Self {
        Self {
            leases: LeaseManager::new(store.clone(), settings.lease_duration()),
            store,
            config_serializer: Arc::new(RawConfigSerializer),
            status_serializer: Arc::new(JsonStatusSerializer),
            config_key: settings.config_key.clone(),
            status_key: settings.status_key.clone(),
        }
    }

    /// Swap in different encodings for the two documents.
    pub fn with_serializers(
        mut self,
        config: Arc<dyn DocumentSerializer<DeploymentConfig>>,
        status: Arc<dyn DocumentSerializer<DeploymentStatus>>,
    ) -> Self {
        self.config_serializer = config;
        self.status_serializer = status;
        self
    }

    pub fn status_key(&self) -> &str {
        &self.status_key
    }

    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    // ── Config ─────────────────────────────────────────────────

    pub async fn fetch_config(&self) -> Result<DeploymentConfig, DepotError> {
        if !self.store.exists(&self.config_key).await? {
            info!(key = %self.config_key, "deployment config not found, using empty config");
            return Ok(DeploymentConfig::default());
        }

        let lease = self.lock_config().await?;
        let read = self.store.read_text(&self.config_key).await;
        let released = self.leases.release(lease).await;
        let data = read?;
        released?;

        self.config_serializer
            .deserialize(&data)
            .map_err(|e| DepotError::serialization(&self.config_key, e))
    }

    pub async fn publish_config(&self, config: &DeploymentConfig) -> Result<(), DepotError> {
        let data = self
            .config_serializer
            .serialize(config)
            .map_err(|e| DepotError::serialization(&self.config_key, e))?;

        let lease = self.lock_config().await?;
        let written = self.store.write_text(&self.config_key, &data).await;
        let released = self.leases.release(lease).await;
        written?;
        released?;

        info!(key = %self.config_key, bytes = data.len(), "deployment config published");
        Ok(())
    }

    /// Lease the config document. A document that does not exist yet cannot
    /// be leased, so its first writer proceeds unlocked and may race another
    /// first writer.
    async fn lock_config(&self) -> Result<Option<Lease>, DepotError> {
        match self.leases.try_acquire(&self.config_key).await? {
            LeaseAttempt::Acquired(lease) => Ok(Some(lease)),
            LeaseAttempt::Missing => Ok(None),
            LeaseAttempt::Held => Err(DepotError::ConfigLocked),
        }
    }

    // ── Status ─────────────────────────────────────────────────

    /// Current status without locking. May be one round stale.
    pub async fn fetch_status(&self) -> Result<DeploymentStatus, DepotError> {
        if !self.store.exists(&self.status_key).await? {
            debug!(key = %self.status_key, "deployment status not found, using empty status");
            return Ok(DeploymentStatus::new());
        }
        let data = self.store.read_text(&self.status_key).await?;
        self.status_serializer
            .deserialize(&data)
            .map_err(|e| DepotError::serialization(&self.status_key, e))
    }

    /// Overwrite the status document without locking.
    pub async fn publish_status(&self, status: &DeploymentStatus) -> Result<(), DepotError> {
        let data = self
            .status_serializer
            .serialize(status)
            .map_err(|e| DepotError::serialization(&self.status_key, e))?;
        self.store.write_text(&self.status_key, &data).await?;
        debug!(key = %self.status_key, entries = status.len(), "deployment status published");
        Ok(())
    }

    /// Read, update and write the status document under its lease.
    ///
    /// Never fails from the caller's point of view: contention returns
    /// [`UpdateOutcome::Skipped`], errors are logged and return
    /// [`UpdateOutcome::Failed`]. The lease is released on every path.
    pub async fn update_status_atomically<F>(&self, update: F) -> UpdateOutcome
    where
        F: FnOnce(DeploymentStatus) -> DeploymentStatus + Send,
    {
        if let Err(e) = self.ensure_status_document().await {
            warn!(
                key = %self.status_key,
                error = %e,
                "could not create deployment status document"
            );
            return UpdateOutcome::Failed;
        }

        let lease = match self.leases.try_acquire(&self.status_key).await {
            Ok(LeaseAttempt::Acquired(lease)) => lease,
            Ok(LeaseAttempt::Held) => {
                info!(
                    key = %self.status_key,
                    "deployment status is locked by another node, skipping update"
                );
                return UpdateOutcome::Skipped;
            }
            Ok(LeaseAttempt::Missing) => {
                warn!(
                    key = %self.status_key,
                    "deployment status vanished before it could be locked, skipping update"
                );
                return UpdateOutcome::Skipped;
            }
            Err(e) => {
                warn!(key = %self.status_key, error = %e, "failed to lock deployment status");
                return UpdateOutcome::Failed;
            }
        };

        let result = self.read_update_write(update).await;

        if let Err(e) = self.leases.release(Some(lease)).await {
            warn!(key = %self.status_key, error = %e, "failed to release deployment status lease");
        }

        match result {
            Ok(entries) => {
                debug!(key = %self.status_key, entries, "deployment status updated");
                UpdateOutcome::Applied
            }
            Err(e) => {
                warn!(key = %self.status_key, error = %e, "deployment status update failed");
                UpdateOutcome::Failed
            }
        }
    }

    async fn read_update_write<F>(&self, update: F) -> Result<usize, DepotError>
    where
        F: FnOnce(DeploymentStatus) -> DeploymentStatus,
    {
        let current = self.fetch_status().await?;
        let next = update(current);
        self.publish_status(&next).await?;
        Ok(next.len())
    }

    /// Create an empty status document so there is something to lease.
    ///
    /// Two nodes that both find the document missing will both write the
    /// empty list; a node that already published in between loses that
    /// round's entry until its next heartbeat.
    async fn ensure_status_document(&self) -> Result<(), DepotError> {
        if self.store.exists(&self.status_key).await? {
            return Ok(());
        }
        info!(key = %self.status_key, "creating empty deployment status document");
        self.publish_status(&DeploymentStatus::new()).await
    }

    // ── Binaries ───────────────────────────────────────────────

    pub async fn has_binaries(&self, app: &AppIdentity) -> Result<bool, DepotError> {
        Ok(self.store.directory_exists(&app.storage_prefix()).await?)
    }

    pub async fn delete_binaries(&self, app: &AppIdentity) -> Result<(), DepotError> {
        if !self.has_binaries(app).await? {
            return Err(DepotError::BinariesNotFound(format!(
                "cannot delete binaries for {app} because they were not found"
            )));
        }
        self.store.delete_directory(&app.storage_prefix()).await?;
        info!(%app, "binaries deleted");
        Ok(())
    }

    pub async fn upload_binaries(
        &self,
        app: &AppIdentity,
        local_path: &Path,
        mode: ConflictResolutionMode,
    ) -> Result<(), DepotError> {
        if !fsutil::contains_files(local_path)
            .await
            .map_err(|e| DepotError::local(local_path, e))?
        {
            return Err(DepotError::BinariesNotFound(format!(
                "nothing to upload for {app}: {} has no files",
                local_path.display()
            )));
        }

        if self.has_binaries(app).await? {
            match mode {
                ConflictResolutionMode::DoNothingIfExists => {
                    info!(%app, "binaries already uploaded, leaving them in place");
                    return Ok(());
                }
                ConflictResolutionMode::FailIfExists => {
                    return Err(DepotError::DuplicateBinaries(format!(
                        "binaries for {app} already exist and mode is {mode}"
                    )));
                }
                ConflictResolutionMode::Overwrite => {
                    self.store.delete_directory(&app.storage_prefix()).await?;
                    info!(%app, "existing binaries removed for overwrite");
                }
            }
        }

        self.store
            .upload_directory(local_path, &app.storage_prefix())
            .await?;
        info!(%app, path = %local_path.display(), "binaries uploaded");
        Ok(())
    }

    /// Download into `local_path`. The store is checked before anything is
    /// created locally, so a missing artifact set leaves no directory behind.
    pub async fn download_binaries(
        &self,
        app: &AppIdentity,
        local_path: &Path,
        mode: ConflictResolutionMode,
    ) -> Result<(), DepotError> {
        let occupied = !fsutil::directory_missing_or_empty(local_path)
            .await
            .map_err(|e| DepotError::local(local_path, e))?;
        if occupied {
            match mode {
                ConflictResolutionMode::DoNothingIfExists => {
                    info!(
                        %app,
                        path = %local_path.display(),
                        "destination already populated, skipping download"
                    );
                    return Ok(());
                }
                ConflictResolutionMode::FailIfExists => {
                    return Err(DepotError::DuplicateBinaries(format!(
                        "cannot download {app}: {} already contains files",
                        local_path.display()
                    )));
                }
                ConflictResolutionMode::Overwrite => {}
            }
        }

        if !self.has_binaries(app).await? {
            return Err(DepotError::BinariesNotFound(format!(
                "binaries for {app} were not found in the repository"
            )));
        }

        self.store
            .download_directory(&app.storage_prefix(), local_path)
            .await?;
        info!(%app, path = %local_path.display(), "binaries downloaded");
        Ok(())
    }
}
