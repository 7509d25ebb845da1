// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps [`tether_core::CoreError`] onto the HTTP error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tether_core::interaction::Resolution;
use tether_core::CoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// An axum handler return-value error. Most paths wrap a [`CoreError`]; the
/// idempotent-retry-after-resolution path (§4.D `duplicate_resolved`) is a
/// 409 carrying the cached [`Resolution`] instead of an error envelope, so
/// the hook can read `decision` straight off the body either way.
pub enum ApiError {
    Core(CoreError),
    ResolvedConflict(Resolution),
}

impl ApiError {
    pub fn conflict(resolution: Resolution) -> Self {
        Self::ResolvedConflict(resolution)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Core(err) => {
                let status =
                    StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let body = ErrorResponse { error: ErrorBody { code: err.kind.as_str().to_owned(), message: err.message } };
                (status, Json(body)).into_response()
            }
            Self::ResolvedConflict(resolution) => (StatusCode::CONFLICT, Json(resolution)).into_response(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
