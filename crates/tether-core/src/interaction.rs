// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventId;
use crate::run::RunId;

/// Opaque interaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(pub Uuid);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of human-in-the-loop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Approval,
    Input,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::Input => "input",
        }
    }

    /// The `*_requested` event type this kind of interaction announces.
    pub fn requested_event_type(&self) -> &'static str {
        match self {
            Self::Approval => crate::event::event_type::APPROVAL_REQUESTED,
            Self::Input => crate::event::event_type::INPUT_REQUESTED,
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Pending,
    Resolved,
}

/// The human's decision on a resolved interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

/// Default rejection message when none is supplied, per §4.D.
pub const DEFAULT_BLOCK_MESSAGE: &str = "User rejected";

/// Default message baked into a timeout's synthetic block decision, per §5.
pub const TIMEOUT_MESSAGE: &str = "interaction timeout";

/// The outcome of resolving an interaction: what the hook's long-poll
/// response body should look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Resolution {
    pub fn allow() -> Self {
        Self { decision: Decision::Allow, message: None, response: None }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self { decision: Decision::Block, message: Some(message.into()), response: None }
    }

    pub fn allow_with_response(response: impl Into<String>) -> Self {
        Self { decision: Decision::Allow, message: None, response: Some(response.into()) }
    }

    /// The synthetic decision returned to a hook whose long-poll deadline
    /// elapsed before resolution (§5, §7). Does not mutate the underlying
    /// pending interaction.
    pub fn timeout() -> Self {
        Self::block(TIMEOUT_MESSAGE)
    }
}

/// A human-in-the-loop request originating from the agent's tool-use hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub run_id: RunId,
    pub kind: InteractionKind,
    pub tool: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub state: InteractionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    /// The `*_requested` event that announced this interaction. Its
    /// sequence number precedes the `*_resolved`/`input_received` event's.
    pub requested_event_id: EventId,
}

#[cfg(test)]
#[path = "interaction_tests.rs"]
mod tests;
