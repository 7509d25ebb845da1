// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `parking_lot`-guarded, all-in-memory [`Repository`]. The only adapter
//! this crate ships; a durable adapter is Open Question territory the
//! design notes resolve in favor of "ship memory-only for v1".

use std::collections::HashMap;

use parking_lot::Mutex;
use tether_core::error::{CoreError, CoreResult, ErrorKind};
use tether_core::event::{Event, EventId};
use tether_core::interaction::{
    Decision, Interaction, InteractionId, InteractionKind, InteractionState, Resolution,
};
use tether_core::repository::Repository;
use tether_core::run::{RepoId, Run, RunId, RunState};

use crate::clock::now_epoch_ms;

#[derive(Default)]
struct Inner {
    runs: HashMap<RunId, Run>,
    /// The one active run per repo, enforced at `create_run`.
    active_run_by_repo: HashMap<RepoId, RunId>,
    events: HashMap<RunId, Vec<Event>>,
    interactions: HashMap<InteractionId, Interaction>,
    interaction_by_key: HashMap<(RunId, String), InteractionId>,
}

/// In-memory [`Repository`]. Cheap to clone; state lives behind the lock.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn create_run(&self, repo_id: &RepoId, prompt: &str, workspace: &str) -> CoreResult<Run> {
        let mut inner = self.inner.lock();
        if inner.active_run_by_repo.contains_key(repo_id) {
            return Err(CoreError::active_run_exists(format!(
                "repo {repo_id} already has an active run"
            )));
        }
        let now = now_epoch_ms();
        let run = Run {
            id: RunId::new(),
            repo_id: repo_id.clone(),
            prompt: prompt.to_owned(),
            workspace: workspace.to_owned(),
            state: RunState::Running,
            created_at: now,
            updated_at: now,
        };
        inner.active_run_by_repo.insert(repo_id.clone(), run.id);
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    fn get_run(&self, id: RunId) -> CoreResult<Run> {
        self.inner
            .lock()
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("run {id} not found")))
    }

    fn update_run_state(&self, id: RunId, new_state: RunState) -> CoreResult<Run> {
        let mut inner = self.inner.lock();
        let repo_id = inner
            .runs
            .get(&id)
            .ok_or_else(|| CoreError::not_found(format!("run {id} not found")))?
            .repo_id
            .clone();
        if new_state.is_terminal() {
            inner.active_run_by_repo.remove(&repo_id);
        }
        let run = inner.runs.get_mut(&id).expect("presence checked above");
        run.state = new_state;
        run.updated_at = now_epoch_ms();
        Ok(run.clone())
    }

    fn list_runs_by_repo(&self, repo_id: &RepoId) -> CoreResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .inner
            .lock()
            .runs
            .values()
            .filter(|r| &r.repo_id == repo_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    fn list_runs_by_state(&self, state: RunState) -> CoreResult<Vec<Run>> {
        Ok(self
            .inner
            .lock()
            .runs
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect())
    }

    fn append_event(&self, run_id: RunId, ty: &str, data: serde_json::Value) -> CoreResult<Event> {
        let mut inner = self.inner.lock();
        if !inner.runs.contains_key(&run_id) {
            return Err(CoreError::not_found(format!("run {run_id} not found")));
        }
        let list = inner.events.entry(run_id).or_default();
        let seq = list.len() as u64 + 1;
        let event = Event {
            id: EventId::new(),
            run_id,
            seq,
            ty: ty.to_owned(),
            data,
            created_at: now_epoch_ms(),
        };
        list.push(event.clone());
        Ok(event)
    }

    fn list_events_by_run(&self, run_id: RunId) -> CoreResult<Vec<Event>> {
        Ok(self.inner.lock().events.get(&run_id).cloned().unwrap_or_default())
    }

    fn list_events_by_run_since(&self, run_id: RunId, seq: u64) -> CoreResult<Vec<Event>> {
        Ok(self
            .inner
            .lock()
            .events
            .get(&run_id)
            .map(|events| events.iter().filter(|e| e.seq > seq).cloned().collect())
            .unwrap_or_default())
    }

    fn create_interaction(
        &self,
        idempotency_key: &str,
        run_id: RunId,
        kind: InteractionKind,
        tool: &str,
        payload: serde_json::Value,
        requested_event_id: EventId,
    ) -> CoreResult<Interaction> {
        let mut inner = self.inner.lock();
        let key = (run_id, idempotency_key.to_owned());
        if let Some(existing) = inner.interaction_by_key.get(&key) {
            return Ok(inner.interactions[existing].clone());
        }
        let interaction = Interaction {
            id: InteractionId::new(),
            run_id,
            kind,
            tool: tool.to_owned(),
            payload,
            idempotency_key: idempotency_key.to_owned(),
            state: InteractionState::Pending,
            resolution: None,
            created_at: now_epoch_ms(),
            resolved_at: None,
            requested_event_id,
        };
        inner.interaction_by_key.insert(key, interaction.id);
        inner.interactions.insert(interaction.id, interaction.clone());
        Ok(interaction)
    }

    fn get_interaction(&self, id: InteractionId) -> CoreResult<Interaction> {
        self.inner
            .lock()
            .interactions
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("interaction {id} not found")))
    }

    fn get_interaction_by_idempotency(
        &self,
        run_id: RunId,
        key: &str,
    ) -> CoreResult<Option<Interaction>> {
        let inner = self.inner.lock();
        Ok(inner
            .interaction_by_key
            .get(&(run_id, key.to_owned()))
            .map(|id| inner.interactions[id].clone()))
    }

    fn list_pending_interactions(&self) -> CoreResult<Vec<Interaction>> {
        Ok(self
            .inner
            .lock()
            .interactions
            .values()
            .filter(|i| i.state == InteractionState::Pending)
            .cloned()
            .collect())
    }

    fn list_pending_interactions_for_run(&self, run_id: RunId) -> CoreResult<Vec<Interaction>> {
        Ok(self
            .inner
            .lock()
            .interactions
            .values()
            .filter(|i| i.run_id == run_id && i.state == InteractionState::Pending)
            .cloned()
            .collect())
    }

    fn resolve_interaction(
        &self,
        id: InteractionId,
        decision: Decision,
        message: Option<String>,
        response: Option<String>,
    ) -> CoreResult<Interaction> {
        let mut inner = self.inner.lock();
        let interaction = inner
            .interactions
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("interaction {id} not found")))?;
        if interaction.state != InteractionState::Pending {
            return Err(CoreError::new(
                ErrorKind::InvalidState,
                format!("interaction {id} already resolved"),
            ));
        }
        interaction.state = InteractionState::Resolved;
        interaction.resolution = Some(Resolution { decision, message, response });
        interaction.resolved_at = Some(now_epoch_ms());
        Ok(interaction.clone())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
