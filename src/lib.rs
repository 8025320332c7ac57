//! Lease-guarded deployment repository for service fleets.
//!
//! Nodes share one object store. Through [`DeploymentRepository`] they
//! fetch and publish the fleet's deployment config, report which app
//! versions they run into a shared status document, and move application
//! binaries in and out of the store.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod fsutil;
pub mod heartbeat;
pub mod lease;
pub mod logging;
pub mod repository;
pub mod server;
pub mod storage;

pub use error::{DepotError, SerializeError, StoreError};
pub use repository::{DeploymentRepository, UpdateOutcome};
