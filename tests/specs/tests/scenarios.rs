// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete end-to-end scenarios for the run lifecycle / event journal /
//! interaction rendezvous, driven through the real HTTP and WebSocket
//! surfaces.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tether_core::run::{RepoId, RunId, RunState};
use tether_core::Repository;
use tether_specs::{create_run, fresh_state, hook_headers, spawn_server, spec_server, ws_connect, ws_recv};
use tether_storage::MemoryRepository;

const TIMEOUT: Duration = Duration::from_secs(5);

fn parse_run_id(s: &str) -> RunId {
    RunId(uuid::Uuid::parse_str(s).unwrap_or_else(|e| panic!("bad run id: {e}")))
}

#[tokio::test]
async fn s1_happy_approval() {
    let state = fresh_state();
    let server = spec_server(state.clone());
    let (addr, _handle) = spawn_server(state).await;

    let run_id = create_run(&server, "r1", "fix bug").await;
    let (mut tx, mut rx) = ws_connect(&addr, &run_id, 0).await;
    let _ = &mut tx; // subscriber never talks back in this scenario

    // Initial replay for an already-active run: the run_started event,
    // then the run's current state.
    let first = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(first["type"], "event");
    assert_eq!(first["event"]["seq"], 1);
    assert_eq!(first["event"]["type"], "run_started");

    let initial_state = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(initial_state["type"], "state");
    assert_eq!(initial_state["state"], "running");

    let headers = hook_headers("req-1");
    let run_id_for_hook = run_id.clone();
    let hook_server = server.clone();
    let hook_task = tokio::spawn(async move {
        hook_server
            .post("/internal/interaction-request")
            .add_header(headers[0].0.clone(), headers[0].1.clone())
            .add_header(headers[1].0.clone(), headers[1].1.clone())
            .json(&serde_json::json!({
                "run_id": run_id_for_hook,
                "type": "approval",
                "tool": "Edit",
                "payload": {},
                "request_id": "req-1",
            }))
            .await
    });

    let second = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(second["event"]["seq"], 2);
    assert_eq!(second["event"]["type"], "approval_requested");

    let third = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(third["type"], "state");
    assert_eq!(third["state"], "waiting_approval");

    let pending = server.get("/approvals/pending").await;
    let interaction_id =
        pending.json::<serde_json::Value>()[0]["id"].as_str().unwrap_or_else(|| panic!("no pending")).to_owned();
    server
        .post(&format!("/approvals/{interaction_id}/resolve"))
        .json(&serde_json::json!({"approved": true}))
        .await
        .assert_status_ok();

    let fourth = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(fourth["event"]["seq"], 3);
    assert_eq!(fourth["event"]["type"], "approval_resolved");
    assert_eq!(fourth["event"]["data"]["decision"], "allow");

    let fifth = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(fifth["type"], "state");
    assert_eq!(fifth["state"], "running");

    let hook_response = hook_task.await.unwrap_or_else(|e| panic!("{e}"));
    hook_response.assert_status_ok();
    let decision: serde_json::Value = hook_response.json();
    assert_eq!(decision["decision"], "allow");
}

#[tokio::test]
async fn s2_rejection() {
    let state = fresh_state();
    let server = spec_server(state);
    let run_id = create_run(&server, "r1", "fix bug").await;

    let hook_run_id = run_id.clone();
    let hook_server = server.clone();
    let hook_task = tokio::spawn(async move {
        let headers = hook_headers("req-1");
        hook_server
            .post("/internal/interaction-request")
            .add_header(headers[0].0.clone(), headers[0].1.clone())
            .add_header(headers[1].0.clone(), headers[1].1.clone())
            .json(&serde_json::json!({
                "run_id": hook_run_id, "type": "approval", "tool": "Edit", "payload": {}, "request_id": "req-1",
            }))
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let pending = server.get("/approvals/pending").await;
    let interaction_id =
        pending.json::<serde_json::Value>()[0]["id"].as_str().unwrap_or_else(|| panic!("no pending")).to_owned();
    server
        .post(&format!("/approvals/{interaction_id}/resolve"))
        .json(&serde_json::json!({"approved": false, "reason": "nope"}))
        .await
        .assert_status_ok();

    let hook_response = hook_task.await.unwrap_or_else(|e| panic!("{e}"));
    let decision: serde_json::Value = hook_response.json();
    assert_eq!(decision["decision"], "block");
    assert_eq!(decision["message"], "nope");

    let run = server.get(&format!("/runs/{run_id}")).await;
    assert_eq!(run.json::<serde_json::Value>()["state"], "failed");
}

#[tokio::test]
async fn s3_idempotent_retry() {
    let state = fresh_state();
    let server = spec_server(state);
    let run_id = create_run(&server, "r1", "fix bug").await;

    let make_request = |run_id: String| {
        let headers = hook_headers("req-2");
        let server = server.clone();
        async move {
            server
                .post("/internal/interaction-request")
                .add_header(headers[0].0.clone(), headers[0].1.clone())
                .add_header(headers[1].0.clone(), headers[1].1.clone())
                .json(&serde_json::json!({
                    "run_id": run_id, "type": "approval", "tool": "Edit", "payload": {}, "request_id": "req-2",
                }))
                .await
        }
    };

    let first_call = tokio::spawn(make_request(run_id.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second_call = tokio::spawn(make_request(run_id.clone()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pending = server.get("/approvals/pending").await;
    let interactions = pending.json::<serde_json::Value>();
    assert_eq!(interactions.as_array().unwrap_or_else(|| panic!("not an array")).len(), 1);
    let interaction_id = interactions[0]["id"].as_str().unwrap_or_else(|| panic!("no pending")).to_owned();

    server
        .post(&format!("/approvals/{interaction_id}/resolve"))
        .json(&serde_json::json!({"approved": true}))
        .await
        .assert_status_ok();

    let first_response = first_call.await.unwrap_or_else(|e| panic!("{e}"));
    let second_response = second_call.await.unwrap_or_else(|e| panic!("{e}"));
    first_response.assert_status_ok();
    second_response.assert_status_ok();
    assert_eq!(first_response.json::<serde_json::Value>()["decision"], "allow");
    assert_eq!(second_response.json::<serde_json::Value>()["decision"], "allow");

    let headers = hook_headers("req-2");
    let third = server
        .post("/internal/interaction-request")
        .add_header(headers[0].0.clone(), headers[0].1.clone())
        .add_header(headers[1].0.clone(), headers[1].1.clone())
        .json(&serde_json::json!({
            "run_id": run_id, "type": "approval", "tool": "Edit", "payload": {}, "request_id": "req-2",
        }))
        .await;
    third.assert_status(axum::http::StatusCode::CONFLICT);
    assert_eq!(third.json::<serde_json::Value>()["decision"], "allow");
}

#[tokio::test]
async fn s4_single_active_run() {
    let state = fresh_state();
    let server = spec_server(state);
    let run_a = create_run(&server, "r1", "a").await;

    let rejected = server
        .post("/runs")
        .json(&serde_json::json!({"repo_id": "r1", "prompt": "b", "workspace": "/ws"}))
        .await;
    rejected.assert_status(axum::http::StatusCode::CONFLICT);

    server.post(&format!("/runs/{run_a}/cancel")).await.assert_status_ok();

    let run_b = server
        .post("/runs")
        .json(&serde_json::json!({"repo_id": "r1", "prompt": "b", "workspace": "/ws"}))
        .await;
    run_b.assert_status_ok();
}

#[tokio::test]
async fn s5_replay_plus_tail() {
    let state = fresh_state();
    let server = spec_server(state.clone());
    let run_id = create_run(&server, "r1", "x").await;
    let run = state.repo.get_run(parse_run_id(&run_id)).unwrap_or_else(|e| panic!("{e}"));

    for _ in 0..3 {
        state.journal.append(run.id, "stdout", serde_json::json!({})).unwrap_or_else(|e| panic!("{e}"));
    }

    let (addr, _handle) = spawn_server(state.clone()).await;
    let (_tx, mut rx) = ws_connect(&addr, &run_id, 0).await;

    // run_started(1) was appended by create_run, then our 3 stdout events (2,3,4).
    let mut observed = Vec::new();
    for _ in 0..4 {
        let envelope = ws_recv(&mut rx, TIMEOUT).await;
        if envelope["type"] == "event" {
            observed.push(envelope["event"]["seq"].as_u64().unwrap_or_else(|| panic!("no seq")));
        }
    }
    assert_eq!(observed, vec![1, 2, 3, 4]);

    let state_envelope = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(state_envelope["type"], "state");

    state.journal.append(run.id, "stdout", serde_json::json!({})).unwrap_or_else(|e| panic!("{e}"));
    let tail = ws_recv(&mut rx, TIMEOUT).await;
    assert_eq!(tail["event"]["seq"], 5);
}

#[tokio::test]
async fn s6_orphan_recovery() {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let run = repo.create_run(&RepoId("r1".into()), "p", "/ws").unwrap_or_else(|e| panic!("{e}"));
    repo.update_run_state(run.id, RunState::WaitingApproval).unwrap_or_else(|e| panic!("{e}"));

    let state = tether_specs::spec_state(repo.clone());
    let recovered = state.lifecycle.recover_orphans().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(recovered.len(), 1);

    let reloaded = repo.get_run(run.id).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(reloaded.state, RunState::Failed);

    let events = repo.list_events_by_run(run.id).unwrap_or_else(|e| panic!("{e}"));
    let last = events.last().unwrap_or_else(|| panic!("no events"));
    assert_eq!(last.ty, "run_failed");
    assert!(last.data["reason"].as_str().unwrap_or_default().contains("Server restarted"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s7_slow_consumer_is_evicted() {
    let state = fresh_state();
    let server = spec_server(state.clone());
    let run_id = create_run(&server, "r1", "x").await;
    let run = state.repo.get_run(parse_run_id(&run_id)).unwrap_or_else(|e| panic!("{e}"));

    let (addr, _handle) = spawn_server(state.clone()).await;
    let (_slow_tx, _slow_rx) = ws_connect(&addr, &run_id, 0).await; // never drained
    let (_fast_tx, mut fast_rx) = ws_connect(&addr, &run_id, 0).await;

    // The fast subscriber drains concurrently with the broadcast loop below
    // so its own bounded queue never fills — only the untouched slow one
    // should be evicted.
    let drain_task = tokio::spawn(async move {
        let mut last_seq = 0u64;
        while last_seq < 301 {
            let envelope = ws_recv(&mut fast_rx, TIMEOUT).await;
            if envelope["type"] == "event" {
                let seq = envelope["event"]["seq"].as_u64().unwrap_or_else(|| panic!("no seq"));
                assert!(seq > last_seq, "event out of order or duplicated");
                last_seq = seq;
            }
        }
        last_seq
    });

    let journal = state.journal.clone();
    let run_id_core = run.id;
    tokio::task::spawn_blocking(move || {
        for _ in 0..300 {
            journal.append(run_id_core, "stdout", serde_json::json!({})).unwrap_or_else(|e| panic!("{e}"));
        }
    })
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    let last_seq = drain_task.await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(last_seq, 301);

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if state.hub.subscriber_count(run.id) <= 1 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("slow subscriber was never evicted");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn s8_input_flow() {
    let state = fresh_state();
    let server = spec_server(state.clone());
    let run_id = create_run(&server, "r1", "x").await;

    let hook_run_id = run_id.clone();
    let hook_server = server.clone();
    let hook_task = tokio::spawn(async move {
        let headers = hook_headers("req-3");
        hook_server
            .post("/internal/interaction-request")
            .add_header(headers[0].0.clone(), headers[0].1.clone())
            .add_header(headers[1].0.clone(), headers[1].1.clone())
            .json(&serde_json::json!({
                "run_id": hook_run_id,
                "type": "input",
                "tool": "AskUserQuestion",
                "payload": {"question": "?"},
                "request_id": "req-3",
            }))
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    server
        .post(&format!("/runs/{run_id}/input"))
        .json(&serde_json::json!({"text": "blue"}))
        .await
        .assert_status_ok();

    let hook_response = hook_task.await.unwrap_or_else(|e| panic!("{e}"));
    let decision: serde_json::Value = hook_response.json();
    assert_eq!(decision["decision"], "allow");
    assert_eq!(decision["response"], "blue");

    let run = server.get(&format!("/runs/{run_id}")).await;
    assert_eq!(run.json::<serde_json::Value>()["state"], "running");

    let events = state.journal.range(parse_run_id(&run_id), 0).unwrap_or_else(|e| panic!("{e}"));
    let received = events.iter().find(|e| e.ty == "input_received").unwrap_or_else(|| panic!("missing event"));
    assert_eq!(received.data, serde_json::json!({"text": "blue"}));
}

/// A subscriber that never sends a frame back loses its socket once the
/// read deadline elapses, well past the last heartbeat ping (§5 Timeouts).
#[tokio::test(start_paused = true)]
async fn ws_idle_subscriber_closed_after_read_deadline() {
    let state = fresh_state();
    let server = spec_server(state.clone());
    let (addr, _handle) = spawn_server(state).await;

    let run_id = create_run(&server, "r1", "x").await;
    let (_tx, mut rx) = ws_connect(&addr, &run_id, 0).await;

    tokio::time::advance(Duration::from_secs(61)).await;

    let mut closed = false;
    for _ in 0..5 {
        match rx.next().await {
            None => {
                closed = true;
                break;
            }
            Some(Err(_)) => {
                closed = true;
                break;
            }
            Some(Ok(_)) => continue, // the initial replay or a heartbeat ping
        }
    }
    assert!(closed, "idle subscriber was not closed after the read deadline");
}
