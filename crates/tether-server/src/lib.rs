// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport around `tether-core`'s run supervisor.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::state::AppState;

/// Build the axum `Router` with every route from §6.1/§6.2.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(http::health))
        .route("/runs", post(http::create_run).get(http::list_runs))
        .route("/runs/{id}", get(http::get_run))
        .route("/runs/{id}/cancel", post(http::cancel_run))
        .route("/runs/{id}/input", post(http::submit_input))
        .route("/runs/{id}/events", get(ws::subscribe))
        .route("/internal/interaction-request", post(http::interaction_request))
        .route("/approvals/pending", get(http::list_pending))
        .route("/approvals/{id}", get(http::get_interaction))
        .route("/approvals/{id}/resolve", post(http::resolve_interaction))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the server until shutdown, performing orphan recovery first.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let repo: Arc<dyn tether_core::Repository> = Arc::new(tether_storage::MemoryRepository::new());
    let state = Arc::new(AppState::new(config, repo));

    let recovered = state.lifecycle.recover_orphans()?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "recovered orphaned runs from a previous process");
    }

    tracing::info!(%addr, "tether listening");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
