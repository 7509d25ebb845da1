// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /runs/{id}/events` — live subscriber WebSocket (§4.C, §6.2).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tether_core::run::RunId;
use tether_core::subscriber::{Envelope, Subscription, HEARTBEAT_INTERVAL_SECS};

use crate::error::{ErrorBody, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from_seq: u64,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<RunId>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let subscription = match Subscription::open(&state.hub, &state.journal, &state.repo, run_id, query.from_seq) {
        Ok(s) => s,
        Err(err) => {
            let status = axum::http::StatusCode::from_u16(err.kind.http_status())
                .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
            let body = ErrorResponse { error: ErrorBody { code: err.kind.as_str().to_owned(), message: err.message } };
            return (status, axum::Json(body)).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, subscription)).into_response()
}

/// How long a subscriber may go without sending any client frame before its
/// socket is closed (§5 Timeouts). Paired with [`HEARTBEAT_INTERVAL_SECS`]:
/// a client that never answers a ping loses its hub slot after this long.
const READ_DEADLINE_SECS: u64 = 60;

async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (mut tx, mut rx) = socket.split();

    for envelope in subscription.take_initial() {
        if send_envelope(&mut tx, &envelope).await.is_err() {
            return;
        }
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.tick().await; // first tick fires immediately; discard it.

    let mut last_activity = tokio::time::Instant::now();

    loop {
        let read_deadline = last_activity + Duration::from_secs(READ_DEADLINE_SECS);
        tokio::select! {
            envelope = subscription.next() => {
                match envelope {
                    Some(envelope) => {
                        if send_envelope(&mut tx, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                if send_envelope(&mut tx, &Envelope::Ping).await.is_err() {
                    break;
                }
            }
            incoming = rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => last_activity = tokio::time::Instant::now(),
                }
            }
            _ = tokio::time::sleep_until(read_deadline) => {
                tracing::warn!("closing idle subscriber: no client frame within the read deadline");
                break;
            }
        }
    }
}

async fn send_envelope(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).unwrap_or_else(|_| "{\"type\":\"ping\"}".to_owned());
    tx.send(Message::Text(text.into())).await
}
