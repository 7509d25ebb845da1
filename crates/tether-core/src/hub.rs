// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run fan-out of events and state changes to live WebSocket
//! subscribers (§4.B).
//!
//! One bounded `mpsc` queue per subscriber rather than a single
//! `broadcast::Sender` per run: a `broadcast` channel lags *every*
//! receiver together when one is slow, but §4.B requires a slow
//! subscriber to be evicted on its own, without affecting the others.
//! `try_send` against each subscriber's own queue gives that isolation
//! directly — a full queue means that one subscriber is evicted, not
//! throttled.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::Event;
use crate::run::{RunId, RunState};

/// Outbound capacity per subscriber queue before it is evicted.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A message delivered to a live subscriber.
#[derive(Debug, Clone)]
pub enum HubMessage {
    Event(Event),
    State(RunState),
}

type Lane = mpsc::Sender<HubMessage>;

#[derive(Default)]
struct Inner {
    runs: HashMap<RunId, HashMap<SubscriberId, Lane>>,
}

/// Shared fan-out registry. Cheap to clone; all state is behind an `Arc`.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<Inner>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `run_id` and return its id plus the
    /// receiving half of its queue. Callers must subscribe *before*
    /// replaying the journal so no event is missed between the replay
    /// snapshot and the first live message (§4.C).
    pub fn register(&self, run_id: RunId) -> (SubscriberId, mpsc::Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = SubscriberId::new();
        self.inner.lock().runs.entry(run_id).or_default().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, run_id: RunId, id: SubscriberId) {
        let mut inner = self.inner.lock();
        if let Some(lanes) = inner.runs.get_mut(&run_id) {
            lanes.remove(&id);
            if lanes.is_empty() {
                inner.runs.remove(&run_id);
            }
        }
    }

    pub fn subscriber_count(&self, run_id: RunId) -> usize {
        self.inner.lock().runs.get(&run_id).map_or(0, HashMap::len)
    }

    pub fn broadcast_event(&self, run_id: RunId, event: Event) {
        self.broadcast(run_id, HubMessage::Event(event));
    }

    pub fn broadcast_state(&self, run_id: RunId, state: RunState) {
        self.broadcast(run_id, HubMessage::State(state));
    }

    fn broadcast(&self, run_id: RunId, message: HubMessage) {
        let mut inner = self.inner.lock();
        let Some(lanes) = inner.runs.get_mut(&run_id) else { return };
        lanes.retain(|_, lane| match lane.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if lanes.is_empty() {
            inner.runs.remove(&run_id);
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
