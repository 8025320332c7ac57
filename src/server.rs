use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest::{self, AppState};
use crate::config::{Config, StoreBackend};
use crate::heartbeat::{self, Heartbeat};
use crate::logging::{self, LogFormat};

pub async fn run(config: Config) -> Result<()> {
    logging::init(&config.daemon.log_level, LogFormat::Json);

    info!(version = env!("CARGO_PKG_VERSION"), "depot daemon starting");

    match config.store.backend {
        StoreBackend::Filesystem => {
            info!(root = %config.store.root.display(), "using filesystem object store");
        }
        StoreBackend::Memory => {
            warn!("using in-memory object store, state is not shared with other nodes");
        }
    }

    let repository = Arc::new(config.build_repository());

    let app: Router =
        rest::router(AppState::new(repository.clone())).layer(TraceLayer::new_for_http());

    let http_addr = &config.daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Spawn status heartbeat
    if config.daemon.heartbeat_interval_secs > 0 {
        let heartbeat = Heartbeat::new(
            config.node.cluster_id.clone(),
            config.node.instance_id.clone(),
            config.node.app_identities(),
        );
        let interval = Duration::from_secs(config.daemon.heartbeat_interval_secs);
        let heartbeat_repository = repository.clone();
        tokio::spawn(async move {
            heartbeat::run_heartbeat_loop(heartbeat_repository, heartbeat, interval).await;
        });
    } else {
        info!("status heartbeat disabled");
    }

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("depot daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
