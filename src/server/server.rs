use anyhow::{Context, Result};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::info;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

use super::metrics::metrics_handler;
use super::{log_requests, make_whatsnew_routes, state::*, ServerConfig};
use crate::background_jobs::SchedulerHandle;
use crate::library::Authenticator;
use crate::whatsnew::{RefreshCoordinator, WhatsNewService};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

impl ServerState {
    fn new(
        config: ServerConfig,
        whatsnew: Arc<WhatsNewService>,
        refresh: Arc<RefreshCoordinator>,
        authenticator: Arc<dyn Authenticator>,
        scheduler_handle: Option<SchedulerHandle>,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            whatsnew,
            refresh,
            authenticator,
            scheduler_handle,
            hash: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    whatsnew: Arc<WhatsNewService>,
    refresh: Arc<RefreshCoordinator>,
    authenticator: Arc<dyn Authenticator>,
    scheduler_handle: Option<SchedulerHandle>,
) -> Router {
    let state = ServerState::new(config, whatsnew, refresh, authenticator, scheduler_handle);

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .nest("/whatsnew", make_whatsnew_routes(state.clone()))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    whatsnew: Arc<WhatsNewService>,
    refresh: Arc<RefreshCoordinator>,
    authenticator: Arc<dyn Authenticator>,
    scheduler_handle: Option<SchedulerHandle>,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, whatsnew, refresh, authenticator, scheduler_handle);
    let metrics_app = Router::new().route("/metrics", get(metrics_handler));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    tokio::try_join!(
        async { axum::serve(listener, app).await.context("HTTP server failed") },
        async {
            axum::serve(metrics_listener, metrics_app)
                .await
                .context("Metrics server failed")
        },
    )?;
    Ok(())
}
