// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property-based coverage of the journal, lifecycle, and interaction
//! registry invariants, exercised directly against `tether-core` rather
//! than through the HTTP surface.

use std::sync::Arc;

use proptest::prelude::*;
use tether_core::interaction::{Decision, InteractionKind};
use tether_core::repository::Repository;
use tether_core::run::{RepoId, RunState};
use tether_core::{Hub, InteractionRegistry, Journal, LifecycleController};
use tether_storage::MemoryRepository;

fn fresh_controller() -> (LifecycleController, Journal, Arc<dyn Repository>) {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let journal = Journal::new(repo.clone());
    let hub = Hub::new();
    let controller = LifecycleController::new(repo.clone(), journal.clone(), hub);
    (controller, journal, repo)
}

proptest! {
    /// `seq` is strictly increasing and gapless from 1, no matter the
    /// event types appended.
    #[test]
    fn journal_seq_is_gapless_and_monotonic(event_types in prop::collection::vec("[a-z_]{1,12}", 1..50)) {
        let (controller, journal, _repo) = fresh_controller();
        let run = controller.create_run(&RepoId("r1".into()), "p", "/ws").unwrap_or_else(|e| panic!("{e}"));

        let mut expected_seq = 1u64; // run_started already claimed seq 1
        for ty in &event_types {
            let event = journal.append(run.id, ty, serde_json::json!({})).unwrap_or_else(|e| panic!("{e}"));
            expected_seq += 1;
            prop_assert_eq!(event.seq, expected_seq);
        }

        let all = journal.range(run.id, 0).unwrap_or_else(|e| panic!("{e}"));
        prop_assert_eq!(all.len() as u64, expected_seq);
        for (i, event) in all.iter().enumerate() {
            prop_assert_eq!(event.seq, i as u64 + 1);
        }
    }

    /// `range(run, k)` always equals the full log filtered to `seq > k`.
    #[test]
    fn journal_range_matches_full_log_filter(
        count in 0usize..40,
        cut in 0u64..45,
    ) {
        let (controller, journal, _repo) = fresh_controller();
        let run = controller.create_run(&RepoId("r1".into()), "p", "/ws").unwrap_or_else(|e| panic!("{e}"));
        for _ in 0..count {
            journal.append(run.id, "stdout", serde_json::json!({})).unwrap_or_else(|e| panic!("{e}"));
        }

        let full = journal.range(run.id, 0).unwrap_or_else(|e| panic!("{e}"));
        let expected: Vec<u64> = full.iter().map(|e| e.seq).filter(|seq| *seq > cut).collect();

        let ranged = journal.range(run.id, cut).unwrap_or_else(|e| panic!("{e}"));
        let actual: Vec<u64> = ranged.iter().map(|e| e.seq).collect();

        prop_assert_eq!(actual, expected);
    }

    /// At most one run per repository is ever active, across an arbitrary
    /// interleaving of create/complete/cancel calls.
    #[test]
    fn single_active_run_per_repo_holds(
        ops in prop::collection::vec(0u8..3, 1..30),
    ) {
        let (controller, _journal, _repo) = fresh_controller();
        let mut current: Option<tether_core::run::RunId> = None;

        for op in ops {
            match op {
                // try to create
                0 => {
                    let result = controller.create_run(&RepoId("r1".into()), "p", "/ws");
                    match (current, result) {
                        (None, Ok(run)) => current = Some(run.id),
                        (Some(_), Err(err)) => {
                            prop_assert_eq!(err.kind, tether_core::error::ErrorKind::ActiveRunExists);
                        }
                        (None, Err(_)) => prop_assert!(false, "creation should succeed with no active run"),
                        (Some(_), Ok(_)) => prop_assert!(false, "two active runs on the same repo"),
                    }
                }
                // complete the active run, if any
                1 => {
                    if let Some(id) = current.take() {
                        controller.complete(id).unwrap_or_else(|e| panic!("{e}"));
                    }
                }
                // cancel the active run, if any
                _ => {
                    if let Some(id) = current.take() {
                        controller.cancel(id).unwrap_or_else(|e| panic!("{e}"));
                    }
                }
            }
        }
    }

    /// `create_or_attach` is idempotent on the `(run, idempotency_key)`
    /// pair regardless of how many times it is retried before resolution.
    #[test]
    fn create_or_attach_returns_the_same_interaction_on_retry(retries in 1usize..10) {
        let (controller, journal, repo) = fresh_controller();
        let run = controller.create_run(&RepoId("r1".into()), "p", "/ws").unwrap_or_else(|e| panic!("{e}"));
        let hub = Hub::new();
        let registry = InteractionRegistry::new(repo.clone(), journal.clone(), hub);

        let (first, _mode) = registry
            .create_or_attach(run.id, InteractionKind::Approval, "bash", serde_json::json!({}), "key")
            .unwrap_or_else(|e| panic!("{e}"));

        for _ in 0..retries {
            let (again, _mode) = registry
                .create_or_attach(run.id, InteractionKind::Approval, "bash", serde_json::json!({}), "key")
                .unwrap_or_else(|e| panic!("{e}"));
            prop_assert_eq!(again.id, first.id);
        }

        let events = journal.range(run.id, 0).unwrap_or_else(|e| panic!("{e}"));
        let requested = events.iter().filter(|e| e.ty == "approval_requested").count();
        prop_assert_eq!(requested, 1, "a retried idempotency key must not re-announce the interaction");
    }

    /// Resolving an interaction always drives the run to the state the
    /// transition table names, for either decision.
    #[test]
    fn resolution_drives_the_correct_run_state(approve in any::<bool>()) {
        let (controller, journal, repo) = fresh_controller();
        let run = controller.create_run(&RepoId("r1".into()), "p", "/ws").unwrap_or_else(|e| panic!("{e}"));
        let hub = Hub::new();
        let registry = InteractionRegistry::new(repo.clone(), journal.clone(), hub);

        let (interaction, _mode) = registry
            .create_or_attach(run.id, InteractionKind::Approval, "bash", serde_json::json!({}), "key")
            .unwrap_or_else(|e| panic!("{e}"));
        controller.start_waiting(run.id, RunState::WaitingApproval).unwrap_or_else(|e| panic!("{e}"));

        let decision = if approve { Decision::Allow } else { Decision::Block };
        registry.resolve(interaction.id, decision, None, None).unwrap_or_else(|e| panic!("{e}"));

        if approve {
            controller.resume_running(run.id).unwrap_or_else(|e| panic!("{e}"));
            prop_assert_eq!(repo.get_run(run.id).unwrap_or_else(|e| panic!("{e}")).state, RunState::Running);
        } else {
            controller.fail(run.id, "rejected").unwrap_or_else(|e| panic!("{e}"));
            prop_assert_eq!(repo.get_run(run.id).unwrap_or_else(|e| panic!("{e}")).state, RunState::Failed);
        }

        let events = journal.range(run.id, 0).unwrap_or_else(|e| panic!("{e}"));
        let requested_seq = events.iter().find(|e| e.ty == "approval_requested").unwrap_or_else(|| panic!("missing")).seq;
        let resolved_seq = events.iter().find(|e| e.ty == "approval_resolved").unwrap_or_else(|| panic!("missing")).seq;
        prop_assert!(requested_seq < resolved_seq);
    }
}
