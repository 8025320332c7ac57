//! `depot config fetch` / `depot config publish <file>`

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use pleme_depot::config::Config;
use pleme_depot::domain::DeploymentConfig;

pub fn fetch(cfg: &Config, output: Option<&Path>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let config = rt
        .block_on(cfg.build_repository().fetch_config())
        .context("fetching deployment config")?;

    match output {
        Some(path) => {
            std::fs::write(path, config.raw_data())
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} Deployment config written to {}",
                "ok".green().bold(),
                path.display()
            );
        }
        None => {
            if config.is_empty() {
                eprintln!("{} No deployment config has been published", "::".blue().bold());
            } else {
                println!("{}", config.raw_data());
            }
        }
    }
    Ok(())
}

pub fn publish(cfg: &Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cfg.build_repository().publish_config(&DeploymentConfig::new(raw)))
        .context("publishing deployment config")?;

    println!(
        "{} Published deployment config from {}",
        "ok".green().bold(),
        file.display()
    );
    Ok(())
}
