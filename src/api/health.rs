// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;
use crate::vault::LockState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Current vault lock state.
    pub vault: LockState,
    pub has_wallet: bool,
    /// Confirmations awaiting a decision.
    pub pending_confirmations: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let vault = state.vault.status().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            vault: vault.state,
            has_wallet: vault.has_wallet,
            pending_confirmations: state.correlator.in_flight(),
        },
    })
}
