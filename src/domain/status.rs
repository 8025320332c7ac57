//! Deployment status: which app versions each instance last reported running.
//!
//! The stored form is a flat list of [`AppDeploymentStatus`] records. In
//! memory the same records are indexed as cluster → instance → app so
//! readers can answer "what does instance X in cluster Y run" directly.
//! [`DeploymentStatus::list_all`] and [`DeploymentStatus::from_statuses`]
//! convert between the two shapes and are inverses of each other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::app_identity::AppIdentity;

/// One instance's report that it runs one app version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppDeploymentStatus {
    #[serde(flatten)]
    app_identity: AppIdentity,
    cluster_id: String,
    instance_id: String,
    #[serde(rename = "UtcTimeStamp")]
    utc_timestamp: DateTime<Utc>,
}

impl AppDeploymentStatus {
    pub fn new(
        app_identity: AppIdentity,
        cluster_id: impl Into<String>,
        instance_id: impl Into<String>,
        utc_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            app_identity,
            cluster_id: cluster_id.into(),
            instance_id: instance_id.into(),
            utc_timestamp,
        }
    }

    pub fn app_identity(&self) -> &AppIdentity {
        &self.app_identity
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn utc_timestamp(&self) -> DateTime<Utc> {
        self.utc_timestamp
    }
}

/// Apps reported by a single instance, at most one entry per identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceDeploymentsStatus {
    apps: BTreeMap<AppIdentity, AppDeploymentStatus>,
}

impl InstanceDeploymentsStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_app_deployment_status(&self, app: &AppIdentity) -> Option<&AppDeploymentStatus> {
        self.apps.get(app)
    }

    /// Insert a status, superseding any previous one for the same identity.
    pub fn set_app_deployment_status(&mut self, status: AppDeploymentStatus) {
        self.apps.insert(status.app_identity.clone(), status);
    }

    pub fn remove_app_deployment_status(
        &mut self,
        app: &AppIdentity,
    ) -> Option<AppDeploymentStatus> {
        self.apps.remove(app)
    }

    pub fn list_all(&self) -> impl Iterator<Item = &AppDeploymentStatus> {
        self.apps.values()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    fn restamp(&mut self, cluster_id: Option<&str>, instance_id: &str) {
        for entry in self.apps.values_mut() {
            if let Some(cluster_id) = cluster_id {
                entry.cluster_id = cluster_id.to_string();
            }
            entry.instance_id = instance_id.to_string();
        }
    }
}

/// Instances of one cluster, keyed by instance id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDeploymentStatus {
    instances: BTreeMap<String, InstanceDeploymentsStatus>,
}

impl ClusterDeploymentStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_app_deployment_status(
        &self,
        instance_id: &str,
        app: &AppIdentity,
    ) -> Option<&AppDeploymentStatus> {
        self.instances
            .get(instance_id)?
            .get_app_deployment_status(app)
    }

    pub fn set_app_deployment_status(&mut self, status: AppDeploymentStatus) {
        self.instances
            .entry(status.instance_id.clone())
            .or_default()
            .set_app_deployment_status(status);
    }

    pub fn get_instance_deployment_status(
        &self,
        instance_id: &str,
    ) -> Option<&InstanceDeploymentsStatus> {
        self.instances.get(instance_id)
    }

    /// Replace everything known about an instance. Entries are re-stamped
    /// with `instance_id`; an empty value removes the instance.
    pub fn set_instance_deployment_status(
        &mut self,
        instance_id: impl Into<String>,
        mut status: InstanceDeploymentsStatus,
    ) {
        let instance_id = instance_id.into();
        if status.is_empty() {
            self.instances.remove(&instance_id);
        } else {
            status.restamp(None, &instance_id);
            self.instances.insert(instance_id, status);
        }
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn list_all(&self) -> impl Iterator<Item = &AppDeploymentStatus> {
        self.instances.values().flat_map(|i| i.list_all())
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn restamp(&mut self, cluster_id: &str) {
        for (instance_id, instance) in &mut self.instances {
            instance.restamp(Some(cluster_id), instance_id);
        }
    }
}

/// Fleet-wide status aggregate, keyed by cluster id.
///
/// Serializes as the flat list produced by [`list_all`](Self::list_all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentStatus {
    clusters: BTreeMap<String, ClusterDeploymentStatus>,
}

impl DeploymentStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the hierarchy from flat records. Later records win on
    /// duplicate `(cluster, instance, app)` keys.
    pub fn from_statuses(statuses: impl IntoIterator<Item = AppDeploymentStatus>) -> Self {
        let mut status = Self::new();
        for app in statuses {
            status.set_app_deployment_status(app);
        }
        status
    }

    pub fn get_app_deployment_status(
        &self,
        cluster_id: &str,
        instance_id: &str,
        app: &AppIdentity,
    ) -> Option<&AppDeploymentStatus> {
        self.clusters
            .get(cluster_id)?
            .get_app_deployment_status(instance_id, app)
    }

    pub fn set_app_deployment_status(&mut self, status: AppDeploymentStatus) {
        self.clusters
            .entry(status.cluster_id.clone())
            .or_default()
            .set_app_deployment_status(status);
    }

    /// Remove one entry, pruning instance and cluster levels left empty.
    pub fn remove_app_deployment_status(
        &mut self,
        cluster_id: &str,
        instance_id: &str,
        app: &AppIdentity,
    ) -> Option<AppDeploymentStatus> {
        let cluster = self.clusters.get_mut(cluster_id)?;
        let instance = cluster.instances.get_mut(instance_id)?;
        let removed = instance.remove_app_deployment_status(app);

        if instance.is_empty() {
            cluster.instances.remove(instance_id);
        }
        if cluster.is_empty() {
            self.clusters.remove(cluster_id);
        }
        removed
    }

    /// Replace everything known about one instance of one cluster, pruning
    /// the cluster if nothing is left in it. Entries take the given ids.
    pub fn set_instance_deployment_status(
        &mut self,
        cluster_id: &str,
        instance_id: &str,
        mut status: InstanceDeploymentsStatus,
    ) {
        status.restamp(Some(cluster_id), instance_id);
        let cluster = self.clusters.entry(cluster_id.to_string()).or_default();
        cluster.set_instance_deployment_status(instance_id, status);
        if cluster.is_empty() {
            self.clusters.remove(cluster_id);
        }
    }

    pub fn get_cluster_deployment_status(
        &self,
        cluster_id: &str,
    ) -> Option<&ClusterDeploymentStatus> {
        self.clusters.get(cluster_id)
    }

    /// Replace a whole cluster; an empty value removes it. Entries are
    /// re-stamped with `cluster_id`.
    pub fn set_cluster_deployment_status(
        &mut self,
        cluster_id: impl Into<String>,
        mut status: ClusterDeploymentStatus,
    ) {
        let cluster_id = cluster_id.into();
        if status.is_empty() {
            self.clusters.remove(&cluster_id);
        } else {
            status.restamp(&cluster_id);
            self.clusters.insert(cluster_id, status);
        }
    }

    pub fn cluster_ids(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    /// Flatten to the stored record list.
    pub fn list_all(&self) -> impl Iterator<Item = &AppDeploymentStatus> {
        self.clusters.values().flat_map(|c| c.list_all())
    }

    /// Entries narrowed to a cluster and/or instance; `None` matches all.
    pub fn list_matching<'a>(
        &'a self,
        cluster_id: Option<&'a str>,
        instance_id: Option<&'a str>,
    ) -> impl Iterator<Item = &'a AppDeploymentStatus> + 'a {
        self.list_all().filter(move |s| {
            cluster_id.map_or(true, |c| s.cluster_id == c)
                && instance_id.map_or(true, |i| s.instance_id == i)
        })
    }

    pub fn len(&self) -> usize {
        self.list_all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.list_all().next().is_none()
    }
}

impl FromIterator<AppDeploymentStatus> for DeploymentStatus {
    fn from_iter<I: IntoIterator<Item = AppDeploymentStatus>>(iter: I) -> Self {
        Self::from_statuses(iter)
    }
}

impl Serialize for DeploymentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.list_all())
    }
}

impl<'de> Deserialize<'de> for DeploymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let statuses = Vec::<AppDeploymentStatus>::deserialize(deserializer)?;
        Ok(Self::from_statuses(statuses))
    }
}
