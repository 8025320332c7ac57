//! `depot binaries upload|download|delete|exists`

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use pleme_depot::config::Config;
use pleme_depot::domain::ConflictResolutionMode;

use super::app_identity;

pub fn upload(
    cfg: &Config,
    id: &str,
    version: &str,
    path: &Path,
    mode: ConflictResolutionMode,
) -> Result<()> {
    let app = app_identity(id, version)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cfg.build_repository().upload_binaries(&app, path, mode))
        .with_context(|| format!("uploading binaries for {app}"))?;

    println!(
        "{} {} available in the repository ({})",
        "ok".green().bold(),
        app.to_string().bold(),
        mode
    );
    Ok(())
}

pub fn download(
    cfg: &Config,
    id: &str,
    version: &str,
    path: &Path,
    mode: ConflictResolutionMode,
) -> Result<()> {
    let app = app_identity(id, version)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cfg.build_repository().download_binaries(&app, path, mode))
        .with_context(|| format!("downloading binaries for {app}"))?;

    println!(
        "{} {} available at {}",
        "ok".green().bold(),
        app.to_string().bold(),
        path.display()
    );
    Ok(())
}

pub fn delete(cfg: &Config, id: &str, version: &str) -> Result<()> {
    let app = app_identity(id, version)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cfg.build_repository().delete_binaries(&app))
        .with_context(|| format!("deleting binaries for {app}"))?;

    println!("{} Deleted binaries for {}", "ok".green().bold(), app.to_string().bold());
    Ok(())
}

pub fn exists(cfg: &Config, id: &str, version: &str) -> Result<()> {
    let app = app_identity(id, version)?;
    let rt = tokio::runtime::Runtime::new()?;
    let present = rt.block_on(cfg.build_repository().has_binaries(&app))?;

    if present {
        println!("{} {} is in the repository", "ok".green().bold(), app.to_string().bold());
        Ok(())
    } else {
        println!("{} {} is not in the repository", "!!".red().bold(), app.to_string().bold());
        std::process::exit(1);
    }
}
