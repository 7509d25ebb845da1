// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-run ordered event log (§4.A).
//!
//! A thin typed facade over the [`Repository`]'s event operations, mirroring
//! a focused wrapper around a lower-level store with its own error
//! handling. The atomicity and gaplessness of `seq` assignment is the
//! storage adapter's responsibility; this facade only shapes the
//! `append`/`range` contract on top of it.

use std::sync::Arc;

use crate::error::CoreResult;
use crate::event::Event;
use crate::repository::Repository;
use crate::run::RunId;

#[derive(Clone)]
pub struct Journal {
    repo: Arc<dyn Repository>,
}

impl Journal {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Atomically assign the next sequence number for `run_id` and append
    /// the event. Fails with `not_found` if the run does not exist.
    pub fn append(&self, run_id: RunId, ty: &str, data: serde_json::Value) -> CoreResult<Event> {
        self.repo.append_event(run_id, ty, data)
    }

    /// All events with `seq > from_seq`, in ascending order. `from_seq = 0`
    /// replays from the first event. Snapshot-consistent: unaffected by
    /// concurrent appends after the snapshot is taken.
    pub fn range(&self, run_id: RunId, from_seq: u64) -> CoreResult<Vec<Event>> {
        if from_seq == 0 {
            self.repo.list_events_by_run(run_id)
        } else {
            self.repo.list_events_by_run_since(run_id, from_seq)
        }
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
