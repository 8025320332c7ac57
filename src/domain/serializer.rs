//! Pluggable text encodings for the repository's documents.

use crate::error::SerializeError;

use super::config::DeploymentConfig;
use super::status::DeploymentStatus;

/// Converts a document to and from the text stored in the object store.
///
/// Implementations must round-trip: `deserialize(serialize(x))` is
/// equivalent to `x`.
pub trait DocumentSerializer<T>: Send + Sync {
    fn serialize(&self, document: &T) -> Result<String, SerializeError>;
    fn deserialize(&self, data: &str) -> Result<T, SerializeError>;
}

/// Stores [`DeploymentStatus`] as a flat JSON array of app statuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStatusSerializer;

impl DocumentSerializer<DeploymentStatus> for JsonStatusSerializer {
    fn serialize(&self, document: &DeploymentStatus) -> Result<String, SerializeError> {
        Ok(serde_json::to_string_pretty(document)?)
    }

    fn deserialize(&self, data: &str) -> Result<DeploymentStatus, SerializeError> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Passes the config text through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawConfigSerializer;

impl DocumentSerializer<DeploymentConfig> for RawConfigSerializer {
    fn serialize(&self, document: &DeploymentConfig) -> Result<String, SerializeError> {
        Ok(document.raw_data().to_string())
    }

    fn deserialize(&self, data: &str) -> Result<DeploymentConfig, SerializeError> {
        Ok(DeploymentConfig::new(data))
    }
}
