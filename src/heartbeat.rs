//! Status heartbeat: a node periodically republishes what it runs.
//!
//! [`Heartbeat::apply`] is the pure status update: it replaces this
//! instance's entries with one fresh entry per running app, so versions the
//! node no longer runs drop out. The loop hands it to
//! [`DeploymentRepository::update_status_atomically`] on every tick; a
//! skipped or failed round is simply retried on the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    AppDeploymentStatus, AppIdentity, DeploymentStatus, InstanceDeploymentsStatus,
};
use crate::repository::{DeploymentRepository, UpdateOutcome};

#[derive(Debug, Clone)]
pub struct Heartbeat {
    cluster_id: String,
    instance_id: String,
    apps: Vec<AppIdentity>,
}

impl Heartbeat {
    pub fn new(
        cluster_id: impl Into<String>,
        instance_id: impl Into<String>,
        apps: Vec<AppIdentity>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            instance_id: instance_id.into(),
            apps,
        }
    }

    /// Status with this instance's entries replaced by one per running app,
    /// all stamped `now`.
    pub fn apply(&self, mut status: DeploymentStatus, now: DateTime<Utc>) -> DeploymentStatus {
        let mut instance = InstanceDeploymentsStatus::new();
        for app in &self.apps {
            instance.set_app_deployment_status(AppDeploymentStatus::new(
                app.clone(),
                self.cluster_id.clone(),
                self.instance_id.clone(),
                now,
            ));
        }
        status.set_instance_deployment_status(&self.cluster_id, &self.instance_id, instance);
        status
    }

    /// Publish one heartbeat round.
    pub async fn beat(&self, repository: &DeploymentRepository) -> UpdateOutcome {
        let now = Utc::now();
        repository
            .update_status_atomically(|status| self.apply(status, now))
            .await
    }
}

/// Beat every `interval` until the task is dropped.
pub async fn run_heartbeat_loop(
    repository: Arc<DeploymentRepository>,
    heartbeat: Heartbeat,
    interval: Duration,
) {
    info!(
        cluster_id = %heartbeat.cluster_id,
        instance_id = %heartbeat.instance_id,
        apps = heartbeat.apps.len(),
        interval_secs = interval.as_secs(),
        "starting status heartbeat loop"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match heartbeat.beat(&repository).await {
            UpdateOutcome::Applied => debug!("status heartbeat published"),
            UpdateOutcome::Skipped => info!("status heartbeat skipped, lease held elsewhere"),
            UpdateOutcome::Failed => warn!("status heartbeat failed, retrying next round"),
        }
    }
}
