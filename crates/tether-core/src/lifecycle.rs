// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run state machine and its write ordering (§4.E).
//!
//! Every transition follows the same order: write the new state to the
//! repository, append the event that explains it to the journal, then
//! broadcast both to live subscribers. A crash between any two steps
//! leaves storage internally consistent — subscribers simply see the
//! broadcast once the process restarts and a client resubscribes, which is
//! why replay exists at all.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::event::event_type;
use crate::hub::Hub;
use crate::journal::Journal;
use crate::repository::Repository;
use crate::run::{RepoId, Run, RunId, RunState};

/// Reason recorded on a run that was active when the server came back up.
pub const ORPHAN_RECOVERY_REASON: &str = "Server restarted";

#[derive(Clone)]
pub struct LifecycleController {
    repo: Arc<dyn Repository>,
    journal: Journal,
    hub: Hub,
}

impl LifecycleController {
    pub fn new(repo: Arc<dyn Repository>, journal: Journal, hub: Hub) -> Self {
        Self { repo, journal, hub }
    }

    fn transition(&self, run_id: RunId, new_state: RunState, ty: &str, data: serde_json::Value) -> CoreResult<Run> {
        let run = self.repo.update_run_state(run_id, new_state)?;
        let event = self.journal.append(run_id, ty, data)?;
        self.hub.broadcast_event(run_id, event);
        self.hub.broadcast_state(run_id, new_state);
        Ok(run)
    }

    /// Transitions whose only side effect is the state broadcast itself —
    /// the journal event that explains the move (`*_requested`,
    /// `*_resolved`) was already appended by the interaction registry.
    fn transition_state_only(&self, run_id: RunId, new_state: RunState) -> CoreResult<Run> {
        let run = self.repo.update_run_state(run_id, new_state)?;
        self.hub.broadcast_state(run_id, new_state);
        Ok(run)
    }

    /// Create a new run for `repo_id`. Fails with `ActiveRunExists` if one
    /// is already active, enforced by the repository at `create_run`.
    pub fn create_run(&self, repo_id: &RepoId, prompt: &str, workspace: &str) -> CoreResult<Run> {
        let run = self.repo.create_run(repo_id, prompt, workspace)?;
        let event = self.journal.append(run.id, event_type::RUN_STARTED, serde_json::json!({
            "prompt": prompt,
            "workspace": workspace,
        }))?;
        self.hub.broadcast_event(run.id, event);
        Ok(run)
    }

    fn require_active(&self, run_id: RunId) -> CoreResult<Run> {
        let run = self.repo.get_run(run_id)?;
        if !run.state.is_active() {
            return Err(CoreError::new(
                ErrorKind::InvalidState,
                format!("run {run_id} is already terminal ({})", run.state),
            ));
        }
        Ok(run)
    }

    /// `running` -> `waiting_approval` or `waiting_input`. Only legal from
    /// `running`; a second interaction on an already-waiting run must be
    /// handled as an idempotent retry at the interaction layer, not as a
    /// second state transition.
    pub fn start_waiting(&self, run_id: RunId, waiting_on: RunState) -> CoreResult<Run> {
        let run = self.repo.get_run(run_id)?;
        if run.state != RunState::Running {
            return Err(CoreError::new(
                ErrorKind::InvalidState,
                format!("run {run_id} is {} , not running", run.state),
            ));
        }
        self.transition_state_only(run_id, waiting_on)
    }

    /// `waiting_approval` / `waiting_input` -> `running`, once the blocking
    /// interaction is resolved. The `approval_resolved`/`input_received`
    /// event was already appended by the interaction registry; this only
    /// updates and broadcasts the run's own state.
    pub fn resume_running(&self, run_id: RunId) -> CoreResult<Run> {
        let run = self.repo.get_run(run_id)?;
        if run.state == RunState::Running {
            return Ok(run);
        }
        if !matches!(run.state, RunState::WaitingApproval | RunState::WaitingInput) {
            return Err(CoreError::new(
                ErrorKind::InvalidState,
                format!("run {run_id} is {}, not waiting", run.state),
            ));
        }
        self.transition_state_only(run_id, RunState::Running)
    }

    pub fn complete(&self, run_id: RunId) -> CoreResult<Run> {
        self.require_active(run_id)?;
        self.transition(run_id, RunState::Completed, event_type::RUN_COMPLETED, serde_json::json!({}))
    }

    pub fn fail(&self, run_id: RunId, reason: &str) -> CoreResult<Run> {
        self.require_active(run_id)?;
        self.transition(run_id, RunState::Failed, event_type::RUN_FAILED, serde_json::json!({"reason": reason}))
    }

    pub fn cancel(&self, run_id: RunId) -> CoreResult<Run> {
        self.require_active(run_id)?;
        self.transition(run_id, RunState::Cancelled, event_type::STATE_CHANGED, serde_json::json!({"state": "cancelled"}))
    }

    /// Force every run left in an active state into `failed`, tagged with
    /// [`ORPHAN_RECOVERY_REASON`]. Call once, at controller startup, before
    /// any client can observe an active run backed by no actual agent
    /// process.
    pub fn recover_orphans(&self) -> CoreResult<Vec<Run>> {
        let mut recovered = Vec::new();
        for state in [RunState::Running, RunState::WaitingApproval, RunState::WaitingInput] {
            for run in self.repo.list_runs_by_state(state)? {
                recovered.push(self.fail(run.id, ORPHAN_RECOVERY_REASON)?);
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
