// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for run lifecycle, input, and approval/interaction
//! rendezvous (§6.1).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tether_core::error::ErrorKind;
use tether_core::interaction::{Decision, InteractionId, InteractionKind, Resolution};
use tether_core::run::{RepoId, RunId, RunState};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::state::AppState;

const HOOK_VERSION_HEADER: &str = "x-m-hook-version";
const HOOK_REQUEST_ID_HEADER: &str = "x-m-request-id";
const SUPPORTED_HOOK_VERSION: &str = "1";

// -- Request/response types ----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub repo_id: String,
    pub prompt: String,
    #[serde(default)]
    pub workspace: String,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub repo_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub run_id: RunId,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub tool: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub request_id: String,
    /// Caller-supplied deadline override, capped by the server default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

/// Applies a resolved interaction's decision to its run: `allow` resumes
/// `running`; `block` on an approval fails the run. (`block` on an `input`
/// interaction is rejected earlier, at the registry.)
fn apply_resolution(state: &AppState, run_id: RunId, kind: InteractionKind, resolution: &Resolution) -> Result<(), ApiError> {
    match (kind, resolution.decision) {
        (InteractionKind::Approval, Decision::Block) => {
            let reason = resolution.message.as_deref().unwrap_or("rejected");
            state.lifecycle.fail(run_id, reason)?;
        }
        _ => {
            state.lifecycle.resume_running(run_id)?;
        }
    }
    Ok(())
}

fn run_state_for_kind(kind: InteractionKind) -> RunState {
    match kind {
        InteractionKind::Approval => RunState::WaitingApproval,
        InteractionKind::Input => RunState::WaitingInput,
    }
}

// -- Run lifecycle ---------------------------------------------------------

/// `POST /runs`
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state.lifecycle.create_run(&RepoId(req.repo_id), &req.prompt, &req.workspace)?;
    Ok(Json(run))
}

/// `GET /runs/{id}`
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RunId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.repo.get_run(id)?))
}

/// `GET /runs?repo_id=...`
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = match query.repo_id {
        Some(repo_id) => state.repo.list_runs_by_repo(&RepoId(repo_id))?,
        None => {
            let mut all = Vec::new();
            for s in [
                RunState::Running,
                RunState::WaitingApproval,
                RunState::WaitingInput,
                RunState::Completed,
                RunState::Failed,
                RunState::Cancelled,
            ] {
                all.extend(state.repo.list_runs_by_state(s)?);
            }
            all
        }
    };
    Ok(Json(runs))
}

/// `POST /runs/{id}/cancel`
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RunId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.lifecycle.cancel(id)?))
}

/// `POST /runs/{id}/input` — resolves the run's sole pending input interaction.
pub async fn submit_input(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RunId>,
    Json(req): Json<InputRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.text.is_empty() {
        return Err(tether_core::CoreError::invalid_input("text must not be empty").into());
    }
    let interaction = state.interactions.resolve_input_by_run(id, req.text)?;
    state.lifecycle.resume_running(id)?;
    Ok(Json(interaction))
}

// -- Approval / interaction rendezvous --------------------------------------

/// `POST /internal/interaction-request` — the agent hook's blocking call.
/// Creates (or attaches to) the interaction, transitions the run into the
/// matching waiting state, then blocks until resolution or the deadline.
///
/// Requires the `X-M-Hook-Version` / `X-M-Request-ID` headers; the latter
/// must agree with the body's `request_id` (§6.1).
pub async fn interaction_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<InteractionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let version = headers
        .get(HOOK_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| tether_core::CoreError::invalid_input("missing X-M-Hook-Version header"))?;
    if version != SUPPORTED_HOOK_VERSION {
        return Err(tether_core::CoreError::invalid_input("unsupported hook version").into());
    }
    let header_request_id = headers
        .get(HOOK_REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| tether_core::CoreError::invalid_input("missing X-M-Request-ID header"))?;
    if header_request_id != req.request_id {
        return Err(tether_core::CoreError::invalid_input("X-M-Request-ID does not match body request_id").into());
    }

    let (interaction, mode) = state.interactions.create_or_attach(
        req.run_id,
        req.kind,
        &req.tool,
        req.payload,
        &req.request_id,
    )?;

    if mode == tether_core::AttachMode::DuplicateResolved {
        // The hook is retrying after the interaction was already resolved;
        // 409 with the cached decision lets it treat this as success.
        let resolution = interaction.resolution.unwrap_or_else(Resolution::allow);
        return Err(ApiError::conflict(resolution));
    }

    match state.lifecycle.start_waiting(req.run_id, run_state_for_kind(req.kind)) {
        Ok(_) => {}
        Err(err) if err.kind == ErrorKind::InvalidState => {
            // Benign on a hook retry: the run is already waiting on this
            // same interaction from a prior attempt.
            let run = state.repo.get_run(req.run_id)?;
            if run.state != run_state_for_kind(req.kind) {
                return Err(err.into());
            }
        }
        Err(err) => return Err(err.into()),
    }

    let requested = req.timeout_ms.map(std::time::Duration::from_millis);
    let deadline_dur = requested
        .map(|d| d.min(state.config.wait_deadline()))
        .unwrap_or_else(|| state.config.wait_deadline());
    let deadline = Instant::now() + deadline_dur;

    let resolution = state.interactions.wait(interaction.id, deadline, &CancellationToken::new()).await?;

    if resolution != Resolution::timeout() {
        apply_resolution(&state, req.run_id, req.kind, &resolution)?;
    }

    Ok(Json(resolution))
}

/// `POST /approvals/{id}/resolve`
pub async fn resolve_interaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<InteractionId>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = if req.approved { Decision::Allow } else { Decision::Block };
    let interaction = state.interactions.resolve(id, decision, req.reason, req.response)?;
    let resolution = interaction.resolution.clone().unwrap_or_else(Resolution::allow);
    apply_resolution(&state, interaction.run_id, interaction.kind, &resolution)?;
    Ok(Json(interaction))
}

/// `GET /approvals/pending`
pub async fn list_pending(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.repo.list_pending_interactions()?))
}

/// `GET /approvals/{id}`
pub async fn get_interaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<InteractionId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.repo.get_interaction(id)?))
}

/// `GET /healthz`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
