//! `depot status show|report|remove`

use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;
use pleme_depot::config::Config;
use pleme_depot::domain::{AppDeploymentStatus, DeploymentStatus};
use pleme_depot::UpdateOutcome;

use super::app_identity;

pub fn show(
    cfg: &Config,
    cluster: Option<&str>,
    instance: Option<&str>,
    format: &str,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(cfg.build_repository().fetch_status())?;
    let entries: Vec<&AppDeploymentStatus> = status.list_matching(cluster, instance).collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            if entries.is_empty() {
                println!("{} No deployments reported", "::".blue().bold());
                return Ok(());
            }
            println!(
                "{:<20} {:<24} {:<24} {:<12} {}",
                "CLUSTER".bold(),
                "INSTANCE".bold(),
                "APP".bold(),
                "VERSION".bold(),
                "REPORTED".bold()
            );
            for entry in entries {
                println!(
                    "{:<20} {:<24} {:<24} {:<12} {}",
                    entry.cluster_id(),
                    entry.instance_id(),
                    entry.app_identity().id(),
                    entry.app_identity().version().to_string(),
                    entry.utc_timestamp().format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
    }
    Ok(())
}

pub fn report(
    cfg: &Config,
    app: &str,
    version: &str,
    cluster: Option<String>,
    instance: Option<String>,
) -> Result<()> {
    let app = app_identity(app, version)?;
    let cluster = cluster.unwrap_or_else(|| cfg.node.cluster_id.clone());
    let instance = instance.unwrap_or_else(|| cfg.node.instance_id.clone());
    let entry =
        AppDeploymentStatus::new(app.clone(), cluster.clone(), instance.clone(), Utc::now());

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(cfg.build_repository().update_status_atomically(
        move |mut status: DeploymentStatus| {
            status.set_app_deployment_status(entry);
            status
        },
    ));

    finish(outcome, &format!("Reported {} on {}/{}", app, cluster, instance))
}

pub fn remove(
    cfg: &Config,
    app: &str,
    version: &str,
    cluster: Option<String>,
    instance: Option<String>,
) -> Result<()> {
    let app = app_identity(app, version)?;
    let cluster = cluster.unwrap_or_else(|| cfg.node.cluster_id.clone());
    let instance = instance.unwrap_or_else(|| cfg.node.instance_id.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let (target, c, i) = (app.clone(), cluster.clone(), instance.clone());
    let outcome = rt.block_on(cfg.build_repository().update_status_atomically(
        move |mut status: DeploymentStatus| {
            status.remove_app_deployment_status(&c, &i, &target);
            status
        },
    ));

    finish(outcome, &format!("Removed {} from {}/{}", app, cluster, instance))
}

fn finish(outcome: UpdateOutcome, message: &str) -> Result<()> {
    match outcome {
        UpdateOutcome::Applied => {
            println!("{} {}", "ok".green().bold(), message);
            Ok(())
        }
        UpdateOutcome::Skipped => {
            bail!("deployment status is locked by another node, try again shortly")
        }
        UpdateOutcome::Failed => bail!("deployment status update failed (see log output)"),
    }
}
