//! AppIdentity: the (id, version) pair naming a deployable package.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Identifies one version of one application.
///
/// Ordering is by id, then by semver precedence, so maps keyed by
/// `AppIdentity` list versions of the same app oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppIdentity {
    id: String,
    version: Version,
}

impl AppIdentity {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Build an identity from a raw version string such as `"1.2.0"`.
    pub fn parse(id: impl Into<String>, version: &str) -> Result<Self, semver::Error> {
        Ok(Self::new(id, version.parse()?))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Object store prefix holding this identity's artifacts: `{id}/{version}`.
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}", self.id, self.version)
    }
}

impl fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}
