pub mod app_identity;
pub mod config;
pub mod conflict;
pub mod serializer;
pub mod status;

pub use app_identity::AppIdentity;
pub use config::DeploymentConfig;
pub use conflict::ConflictResolutionMode;
pub use serializer::{DocumentSerializer, JsonStatusSerializer, RawConfigSerializer};
pub use status::{
    AppDeploymentStatus, ClusterDeploymentStatus, DeploymentStatus, InstanceDeploymentsStatus,
};
