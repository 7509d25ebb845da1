// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tether_core::ErrorKind;

use crate::error::{ErrorBody, ErrorResponse};
use crate::state::AppState;

/// Constant-time string comparison to avoid a timing side channel on the
/// bearer token check.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorKind> {
    let Some(expected) = expected else { return Ok(()) };
    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorKind::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ErrorKind::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorKind::Unauthorized)
    }
}

fn validate_query_token(query: &str, expected: Option<&str>) -> Result<(), ErrorKind> {
    let Some(expected) = expected else { return Ok(()) };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if constant_time_eq(value, expected) {
                return Ok(());
            }
        }
    }
    Err(ErrorKind::Unauthorized)
}

/// Enforces Bearer token auth. `/healthz` and the event WebSocket accept
/// either the header or a `?token=` query param, since not every client
/// upgrading a WebSocket can set custom headers.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if path == "/healthz" {
        return next.run(req).await;
    }

    let expected = state.config.auth_token.as_deref();
    let result = if path.ends_with("/events") {
        let query = req.uri().query().unwrap_or("");
        validate_bearer(req.headers(), expected).or_else(|_| validate_query_token(query, expected))
    } else {
        validate_bearer(req.headers(), expected)
    };

    if let Err(kind) = result {
        let body = ErrorResponse { error: ErrorBody { code: kind.as_str().to_owned(), message: "unauthorized".to_owned() } };
        return (StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::UNAUTHORIZED), axum::Json(body))
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
