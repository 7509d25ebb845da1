// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::RunId;

/// Opaque event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known event type strings. The vocabulary is deliberately open —
/// any short string is a legal event type — so this enum exists only to
/// give the well-known ones a typed constructor; `Event::ty` itself stays
/// `String` at the storage boundary (see §9's "duck-typed JSON payloads"
/// note, applied here to the type tag as well).
pub mod event_type {
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
    pub const TOOL_CALL_START: &str = "tool_call_start";
    pub const TOOL_CALL_END: &str = "tool_call_end";
    pub const APPROVAL_REQUESTED: &str = "approval_requested";
    pub const INPUT_REQUESTED: &str = "input_requested";
    pub const APPROVAL_RESOLVED: &str = "approval_resolved";
    pub const INPUT_RECEIVED: &str = "input_received";
    pub const RUN_STARTED: &str = "run_started";
    pub const RUN_COMPLETED: &str = "run_completed";
    pub const RUN_FAILED: &str = "run_failed";
    pub const STATE_CHANGED: &str = "state_changed";
}

/// A single journaled event. `seq` is strictly increasing and gapless
/// within a run, assigned by the storage layer (never by callers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub run_id: RunId,
    pub seq: u64,
    #[serde(rename = "type")]
    pub ty: String,
    /// Opaque JSON payload. Empty object when the source had none.
    pub data: serde_json::Value,
    pub created_at: u64,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
