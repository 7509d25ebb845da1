// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-poll rendezvous between a hook's blocking HTTP request and the
//! human who eventually resolves it (§4.D).
//!
//! A hook calls [`InteractionRegistry::wait`] and blocks until
//! [`InteractionRegistry::resolve`] is called for the same interaction, the
//! deadline elapses, or the caller cancels. Notification is
//! [`tokio::sync::Notify`] backed by a periodic safety poll, so a missed
//! wakeup (the classic notify-before-wait race) is bounded by one poll
//! interval rather than hanging forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::event::event_type;
use crate::hub::Hub;
use crate::interaction::{
    Decision, Interaction, InteractionId, InteractionKind, InteractionState, Resolution, DEFAULT_BLOCK_MESSAGE,
};
use crate::journal::Journal;
use crate::repository::Repository;
use crate::run::{RunId, RunState};

/// How often [`InteractionRegistry::wait`] re-checks storage even without a
/// notification, as a backstop against a missed wakeup.
pub const SAFETY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The long-poll's hard ceiling (§5, §7). Past this, the hook gets a
/// synthetic `block` decision without the underlying interaction being
/// touched.
pub const DEFAULT_WAIT_DEADLINE: Duration = Duration::from_secs(300);

/// Which of the three `create_or_attach` paths (§4.D) produced an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    Fresh,
    DuplicatePending,
    DuplicateResolved,
}

#[derive(Clone)]
pub struct InteractionRegistry {
    repo: Arc<dyn Repository>,
    journal: Journal,
    hub: Hub,
    waiters: Arc<Mutex<HashMap<InteractionId, Arc<Notify>>>>,
}

impl InteractionRegistry {
    pub fn new(repo: Arc<dyn Repository>, journal: Journal, hub: Hub) -> Self {
        Self { repo, journal, hub, waiters: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn notify_for(&self, id: InteractionId) -> Arc<Notify> {
        self.waiters.lock().entry(id).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    /// Create a new interaction, or return the existing one if `idempotency_key`
    /// was already seen for this run (the hook's own retry path, §4.D).
    /// Appends the `*_requested` event exactly once, on first creation.
    /// Past the idempotency check, the run must exist and be `running`
    /// (`not_found`/`invalid_state`); nothing is written otherwise.
    pub fn create_or_attach(
        &self,
        run_id: RunId,
        kind: InteractionKind,
        tool: &str,
        payload: serde_json::Value,
        idempotency_key: &str,
    ) -> CoreResult<(Interaction, AttachMode)> {
        if let Some(existing) = self.repo.get_interaction_by_idempotency(run_id, idempotency_key)? {
            let mode = if existing.state == InteractionState::Resolved {
                AttachMode::DuplicateResolved
            } else {
                AttachMode::DuplicatePending
            };
            return Ok((existing, mode));
        }
        let run = self.repo.get_run(run_id)?;
        if run.state != RunState::Running {
            return Err(CoreError::new(
                ErrorKind::InvalidState,
                format!("run {run_id} is {}, not running", run.state),
            ));
        }
        let event = self.journal.append(run_id, kind.requested_event_type(), payload.clone())?;
        let interaction = self.repo.create_interaction(
            idempotency_key,
            run_id,
            kind,
            tool,
            payload,
            event.id,
        )?;
        self.hub.broadcast_event(run_id, event);
        Ok((interaction, AttachMode::Fresh))
    }

    /// Block until `id` resolves, `deadline` elapses, or `cancel` fires.
    /// A timeout never mutates the interaction: it is still pending
    /// afterward and a late `resolve` call still succeeds.
    pub async fn wait(
        &self,
        id: InteractionId,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> CoreResult<Resolution> {
        let notify = self.notify_for(id);
        loop {
            let interaction = self.repo.get_interaction(id)?;
            if let Some(resolution) = interaction.resolution {
                self.waiters.lock().remove(&id);
                return Ok(resolution);
            }
            if Instant::now() >= deadline {
                return Ok(Resolution::timeout());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let tick = remaining.min(SAFETY_POLL_INTERVAL);
            tokio::select! {
                () = notify.notified() => {}
                () = tokio::time::sleep(tick) => {}
                () = cancel.cancelled() => {
                    return Err(CoreError::new(ErrorKind::Conflict, "wait cancelled by caller"));
                }
            }
        }
    }

    /// Resolve a pending interaction: appends the matching `*_resolved`/
    /// `input_received` event, broadcasts it, and wakes any waiter.
    ///
    /// Rejecting an `input` interaction is not a meaningful operation (there
    /// is nothing to roll back to); callers get `invalid_input` instead. A
    /// `block` decision with no reason is stamped with
    /// [`DEFAULT_BLOCK_MESSAGE`].
    pub fn resolve(
        &self,
        id: InteractionId,
        decision: Decision,
        message: Option<String>,
        response: Option<String>,
    ) -> CoreResult<Interaction> {
        if decision == Decision::Block {
            let existing = self.repo.get_interaction(id)?;
            if existing.kind == InteractionKind::Input {
                return Err(CoreError::invalid_input("input interactions cannot be rejected"));
            }
        }
        let message = match decision {
            Decision::Block => Some(message.unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_owned())),
            Decision::Allow => message,
        };
        let interaction = self.repo.resolve_interaction(id, decision, message, response)?;
        let (event_type, payload) = match interaction.kind {
            InteractionKind::Approval => (
                event_type::APPROVAL_RESOLVED,
                serde_json::to_value(&interaction.resolution).unwrap_or(serde_json::Value::Null),
            ),
            InteractionKind::Input => {
                let text = interaction.resolution.as_ref().and_then(|r| r.response.clone()).unwrap_or_default();
                (event_type::INPUT_RECEIVED, serde_json::json!({"text": text}))
            }
        };
        let event = self.journal.append(interaction.run_id, event_type, payload)?;
        self.hub.broadcast_event(interaction.run_id, event);
        if let Some(notify) = self.waiters.lock().get(&id) {
            notify.notify_waiters();
        }
        Ok(interaction)
    }

    /// Resolve the sole pending `input` interaction on a run. Used by the
    /// `POST /runs/{id}/input` surface, which addresses an interaction by
    /// run rather than by interaction id.
    pub fn resolve_input_by_run(&self, run_id: RunId, response: String) -> CoreResult<Interaction> {
        let target = self
            .repo
            .list_pending_interactions_for_run(run_id)?
            .into_iter()
            .find(|i| i.kind == InteractionKind::Input && i.state == InteractionState::Pending)
            .ok_or_else(|| CoreError::not_found(format!("no pending input interaction for run {run_id}")))?;
        self.resolve(target.id, Decision::Allow, None, Some(response))
    }
}

#[cfg(test)]
#[path = "interaction_registry_tests.rs"]
mod tests;
