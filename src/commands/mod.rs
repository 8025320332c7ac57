pub mod binaries;
pub mod config;
pub mod daemon;
pub mod status;

use anyhow::{Context, Result};
use pleme_depot::domain::AppIdentity;

fn app_identity(id: &str, version: &str) -> Result<AppIdentity> {
    AppIdentity::parse(id, version).with_context(|| format!("invalid version '{version}' for {id}"))
}
