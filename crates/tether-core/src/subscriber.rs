// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The subscriber session contract for a single live WebSocket connection
//! (§4.C): subscribe before replay, snapshot the journal, replay it, then
//! tail live messages filtered against the replay's watermark so the
//! subscribe/replay race can never double-deliver or drop an event.

use std::sync::Arc;

use serde::Serialize;

use crate::error::CoreResult;
use crate::event::Event;
use crate::hub::{Hub, HubMessage, SubscriberId};
use crate::journal::Journal;
use crate::repository::Repository;
use crate::run::{RunId, RunState};

/// Idle-connection heartbeat interval. A subscriber that neither replays
/// nor tails anything for this long still sees a `ping` frame.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 54;

/// A message written to the WebSocket wire, per §4.C's envelope shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Event(Event),
    State { state: RunState },
    Ping,
}

/// A live subscription: a replay snapshot to drain first, then a tail of
/// subsequent live messages.
pub struct Subscription {
    hub: Hub,
    id: SubscriberId,
    run_id: RunId,
    rx: tokio::sync::mpsc::Receiver<HubMessage>,
    watermark: u64,
    replay: Vec<Event>,
    current_state: Option<RunState>,
}

impl Subscription {
    /// Open a subscription starting after `from_seq`. Registers with the
    /// hub *before* reading the journal so a concurrent append can never
    /// land in the gap between the snapshot and the first live message —
    /// at worst it is seen twice, and the watermark filter in [`Self::next`]
    /// discards the duplicate.
    pub fn open(
        hub: &Hub,
        journal: &Journal,
        repo: &Arc<dyn Repository>,
        run_id: RunId,
        from_seq: u64,
    ) -> CoreResult<Self> {
        let (id, rx) = hub.register(run_id);
        let run = repo.get_run(run_id)?;
        let replay = journal.range(run_id, from_seq)?;
        let watermark = replay.last().map_or(from_seq, |e| e.seq);
        let current_state = run.state.is_active().then_some(run.state);
        Ok(Self { hub: hub.clone(), id, run_id, rx, watermark, replay, current_state })
    }

    /// Drain the replay snapshot and, if the run is still active, the
    /// current-state envelope that should follow it. Call once, before
    /// [`Self::next`].
    pub fn take_initial(&mut self) -> Vec<Envelope> {
        let mut out: Vec<Envelope> =
            std::mem::take(&mut self.replay).into_iter().map(Envelope::Event).collect();
        if let Some(state) = self.current_state.take() {
            out.push(Envelope::State { state });
        }
        out
    }

    /// Wait for the next live message, skipping anything already covered
    /// by the replay watermark. Returns `None` once the hub drops this
    /// subscriber's lane (run gone, or evicted for a full queue).
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await? {
                HubMessage::Event(event) => {
                    if event.seq <= self.watermark {
                        continue;
                    }
                    self.watermark = event.seq;
                    return Some(Envelope::Event(event));
                }
                HubMessage::State(state) => return Some(Envelope::State { state }),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.run_id, self.id);
    }
}

#[cfg(test)]
#[path = "subscriber_tests.rs"]
mod tests;
