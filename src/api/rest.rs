use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::AppDeploymentStatus;
use crate::error::DepotError;
use crate::repository::DeploymentRepository;

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<DeploymentRepository>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(repository: Arc<DeploymentRepository>) -> Self {
        Self {
            repository,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub cluster: Option<String>,
    pub instance: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/status/{cluster}", get(cluster_status))
        .route("/api/v1/config", get(config))
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn api_error(e: DepotError) -> ApiError {
    let code = match e {
        DepotError::ConfigLocked => StatusCode::LOCKED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn status(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<AppDeploymentStatus>>, ApiError> {
    let status = state.repository.fetch_status().await.map_err(api_error)?;
    Ok(Json(
        status
            .list_matching(filter.cluster.as_deref(), filter.instance.as_deref())
            .cloned()
            .collect(),
    ))
}

async fn cluster_status(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> Result<Json<Vec<AppDeploymentStatus>>, ApiError> {
    let status = state.repository.fetch_status().await.map_err(api_error)?;
    match status.get_cluster_deployment_status(&cluster) {
        Some(cluster) => Ok(Json(cluster.list_all().cloned().collect())),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("no status reported for cluster {cluster}"),
        )),
    }
}

async fn config(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .repository
        .fetch_config()
        .await
        .map(|config| config.raw_data().to_string())
        .map_err(api_error)
}
