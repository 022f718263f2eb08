// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operational tooling for the relay.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResetRateLimitsRequest {
    /// Origin to reset. All origins when omitted.
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetRateLimitsResponse {
    pub origin: Option<String>,
    /// Origins still tracked after the reset.
    pub tracked_origins: usize,
}

#[utoipa::path(
    post,
    path = "/v1/admin/rate-limits/reset",
    request_body = ResetRateLimitsRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses((status = 200, body = ResetRateLimitsResponse))
)]
pub async fn reset_rate_limits(
    State(state): State<AppState>,
    Json(request): Json<ResetRateLimitsRequest>,
) -> Json<ResetRateLimitsResponse> {
    match &request.origin {
        Some(origin) => state.limiter.reset(origin),
        None => state.limiter.clear(),
    }
    info!(origin = ?request.origin, "Rate limits reset");
    Json(ResetRateLimitsResponse {
        origin: request.origin,
        tracked_origins: state.limiter.len(),
    })
}
