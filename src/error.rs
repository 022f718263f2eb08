// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::confirm::ResolveError;
use crate::vault::VaultError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn locked(message: impl Into<String>) -> Self {
        Self::new(StatusCode::LOCKED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidPin => Self::bad_request("PIN must be 6 digits"),
            VaultError::NoWallet => Self::not_found("No wallet found"),
            VaultError::WrongPin { attempts_remaining } => Self::unauthorized(format!(
                "Invalid PIN. {attempts_remaining} attempts remaining"
            )),
            VaultError::LockedOut { retry_after } => Self::locked(format!(
                "Too many failed attempts. Retry in {}s",
                retry_after.as_secs().max(1)
            )),
            other => {
                error!(error = %other, "Vault operation failed");
                Self::internal("Vault operation failed")
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Locked => Self::locked("Wallet is locked"),
            ResolveError::NotFound(request_id) => {
                Self::not_found(format!("Confirmation {request_id} not found"))
            }
            ResolveError::Correlator(e) => {
                error!(error = %e, "Confirmation resolution failed");
                Self::internal("Confirmation resolution failed")
            }
        }
    }
}
