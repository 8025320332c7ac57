//! Layered settings: built-in defaults, then a YAML file, then `DEPOT_*`
//! environment variables (`__` separates nesting, e.g.
//! `DEPOT_STORE__ROOT=/srv/depot`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::AppIdentity;
use crate::repository::DeploymentRepository;
use crate::storage::{FsObjectStore, MemoryObjectStore, ObjectStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub repository: RepositoryConfig,
    pub node: NodeConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Bucket directory for the filesystem backend.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            root: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("depot")
                .join("store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub config_key: String,
    pub status_key: String,
    pub lease_duration_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            config_key: "DeploymentConfig.json".to_string(),
            status_key: "DeploymentStatus.json".to_string(),
            lease_duration_secs: 60,
        }
    }
}

impl RepositoryConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }
}

/// Where this node sits in the fleet and what it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub cluster_id: String,
    pub instance_id: String,
    pub apps: Vec<AppEntry>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cluster_id: "default".to_string(),
            instance_id: default_instance_id(),
            apps: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn app_identities(&self) -> Vec<AppIdentity> {
        self.apps.iter().map(AppEntry::identity).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    pub id: String,
    pub version: semver::Version,
}

impl AppEntry {
    pub fn identity(&self) -> AppIdentity {
        AppIdentity::new(self.id.clone(), self.version.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    /// Seconds between status heartbeats; 0 disables them.
    pub heartbeat_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9200".to_string(),
            log_level: "info".to_string(),
            heartbeat_interval_secs: 30,
        }
    }
}

fn default_instance_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("depot").join("config.yaml"))
    }

    /// Build the object store named by `store.backend`.
    pub fn build_store(&self) -> Arc<dyn ObjectStore> {
        match self.store.backend {
            StoreBackend::Filesystem => Arc::new(FsObjectStore::new(&self.store.root)),
            StoreBackend::Memory => Arc::new(MemoryObjectStore::new()),
        }
    }

    pub fn build_repository(&self) -> DeploymentRepository {
        DeploymentRepository::new(self.build_store(), &self.repository)
    }

    fn validate(&self) -> Result<()> {
        if self.repository.lease_duration_secs == 0 {
            bail!("repository.lease_duration_secs must be greater than zero");
        }
        if self.repository.config_key == self.repository.status_key {
            bail!("repository.config_key and repository.status_key must differ");
        }
        Ok(())
    }
}

/// Load settings. An explicit `path` must exist; the default path is
/// optional.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let file = match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} does not exist", p.display());
            }
            p.to_path_buf()
        }
        None => Config::default_path()?,
    };

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&file))
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .with_context(|| format!("loading config from {}", file.display()))?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.repository.config_key, "DeploymentConfig.json");
        assert_eq!(config.repository.lease_duration(), Duration::from_secs(60));
        assert!(!config.node.instance_id.is_empty());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
store:
  backend: memory
repository:
  lease_duration_secs: 15
node:
  cluster_id: east
  instance_id: node-1
  apps:
    - id: svc-a
      version: 1.2.0
daemon:
  heartbeat_interval_secs: 5
"#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.repository.lease_duration_secs, 15);
        assert_eq!(config.repository.status_key, "DeploymentStatus.json");
        assert_eq!(config.node.cluster_id, "east");
        assert_eq!(
            config.node.app_identities(),
            vec![AppIdentity::parse("svc-a", "1.2.0").unwrap()]
        );
        assert_eq!(config.daemon.heartbeat_interval_secs, 5);
        assert_eq!(config.daemon.http_addr, "127.0.0.1:9200");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn zero_lease_duration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "repository:\n  lease_duration_secs: 0\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
