// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage boundary (§6.3). Dependency-inverted: the core depends only
//! on this trait, never on a concrete store. All operations are synchronous
//! — concurrency within the store is the store's own responsibility. A
//! concrete adapter lives in the `tether-storage` crate.

use crate::error::CoreResult;
use crate::event::Event;
use crate::interaction::{Decision, Interaction, InteractionKind};
use crate::run::{RepoId, Run, RunId, RunState};

/// Narrow interface to durable storage for runs, events, and interactions.
///
/// Implementations must guarantee:
/// - `append_event` assigns `seq` atomically and gaplessly per run.
/// - `create_run` and `update_run_state` participate correctly in the
///   single-active-run-per-repo invariant (the former fails with
///   `ErrorKind::ActiveRunExists`, the lifecycle controller is the only
///   caller of the latter).
/// - `create_interaction` enforces `(run_id, idempotency_key)` uniqueness.
/// - `resolve_interaction` is only legal on a pending interaction.
pub trait Repository: Send + Sync {
    fn create_run(&self, repo_id: &RepoId, prompt: &str, workspace: &str) -> CoreResult<Run>;
    fn get_run(&self, id: RunId) -> CoreResult<Run>;
    fn update_run_state(&self, id: RunId, new_state: RunState) -> CoreResult<Run>;
    fn list_runs_by_repo(&self, repo_id: &RepoId) -> CoreResult<Vec<Run>>;
    fn list_runs_by_state(&self, state: RunState) -> CoreResult<Vec<Run>>;

    fn append_event(&self, run_id: RunId, ty: &str, data: serde_json::Value) -> CoreResult<Event>;
    fn list_events_by_run(&self, run_id: RunId) -> CoreResult<Vec<Event>>;
    fn list_events_by_run_since(&self, run_id: RunId, seq: u64) -> CoreResult<Vec<Event>>;

    fn create_interaction(
        &self,
        idempotency_key: &str,
        run_id: RunId,
        kind: InteractionKind,
        tool: &str,
        payload: serde_json::Value,
        requested_event_id: crate::event::EventId,
    ) -> CoreResult<Interaction>;
    fn get_interaction(&self, id: crate::interaction::InteractionId) -> CoreResult<Interaction>;
    fn get_interaction_by_idempotency(
        &self,
        run_id: RunId,
        key: &str,
    ) -> CoreResult<Option<Interaction>>;
    fn list_pending_interactions(&self) -> CoreResult<Vec<Interaction>>;
    fn list_pending_interactions_for_run(&self, run_id: RunId) -> CoreResult<Vec<Interaction>>;
    fn resolve_interaction(
        &self,
        id: crate::interaction::InteractionId,
        decision: Decision,
        message: Option<String>,
        response: Option<String>,
    ) -> CoreResult<Interaction>;
}
