// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confirmation endpoints: what the popup renders and the decision it sends
//! back. Each request id resolves at most once.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    confirm::{PendingConfirmation, Resolution},
    error::ApiError,
    state::AppState,
};

/// Outcome of a decision.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolutionResponse {
    pub request_id: String,
    /// Whether the response reached the requesting tab.
    pub delivered: bool,
    /// The JSON-RPC response sent to the page.
    #[schema(value_type = Object)]
    pub response: Value,
}

impl ResolutionResponse {
    fn new(request_id: String, resolution: Resolution) -> Self {
        Self {
            request_id,
            delivered: resolution.delivered,
            response: resolution.response.to_value(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/confirmations/{request_id}",
    params(("request_id" = String, Path, description = "Confirmation request id")),
    tag = "Confirmations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = PendingConfirmation),
        (status = 404, description = "Unknown or already resolved")
    )
)]
pub async fn get_confirmation(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PendingConfirmation>, ApiError> {
    let pending = state.correlator.get(&request_id).map_err(|e| {
        tracing::warn!(error = %e, "Session storage read failed");
        ApiError::internal("Session storage unavailable")
    })?;
    pending
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Confirmation {request_id} not found")))
}

#[utoipa::path(
    post,
    path = "/v1/confirmations/{request_id}/approve",
    params(("request_id" = String, Path, description = "Confirmation request id")),
    tag = "Confirmations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = ResolutionResponse),
        (status = 404, description = "Unknown or already resolved"),
        (status = 423, description = "Wallet is locked")
    )
)]
pub async fn approve(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let resolution = state
        .correlator
        .approve(&request_id, &state.vault, state.handler.as_ref())
        .await?;
    Ok(Json(ResolutionResponse::new(request_id, resolution)))
}

#[utoipa::path(
    post,
    path = "/v1/confirmations/{request_id}/reject",
    params(("request_id" = String, Path, description = "Confirmation request id")),
    tag = "Confirmations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = ResolutionResponse),
        (status = 404, description = "Unknown or already resolved")
    )
)]
pub async fn reject(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let resolution = state.correlator.reject(&request_id)?;
    Ok(Json(ResolutionResponse::new(request_id, resolution)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{state, Harness, ORIGIN};
    use crate::rpc::{codes, RpcRequest, RpcResponse};
    use crate::vault::SecretSeed;
    use axum::http::StatusCode;
    use serde_json::json;

    async fn open(state: &AppState, harness: &mut Harness, id: &str) -> String {
        let launch = state
            .correlator
            .open(
                RpcRequest::new(id, "getAddresses", json!({})),
                harness.port.tab_id(),
                ORIGIN,
            )
            .unwrap();
        harness.launches.recv().await.unwrap();
        launch.request_id
    }

    #[tokio::test]
    async fn get_returns_pending_context() {
        let (state, mut harness) = state();
        let request_id = open(&state, &mut harness, "a").await;

        let Json(pending) = get_confirmation(Path(request_id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(pending.request_id, request_id);
        assert_eq!(pending.origin, ORIGIN);

        let err = get_confirmation(Path("nope".to_string()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approve_is_refused_while_locked() {
        let (state, mut harness) = state();
        let request_id = open(&state, &mut harness, "a").await;

        let err = approve(Path(request_id.clone()), State(state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::LOCKED);
        assert!(state.correlator.get(&request_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn approve_delivers_handler_result() {
        let (state, mut harness) = state();
        state
            .vault
            .create_wallet(SecretSeed::new("seed"), "123456")
            .await
            .unwrap();
        state.vault.unlock("123456").await.unwrap();
        let request_id = open(&state, &mut harness, "a").await;

        let Json(body) = approve(Path(request_id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert!(body.delivered);
        assert_eq!(body.response["id"], "a");

        let message = harness.port.recv().await.unwrap();
        let response: RpcResponse = serde_json::from_value(message.payload).unwrap();
        assert!(response.into_result().unwrap()["addresses"].is_array());

        let again = approve(Path(request_id), State(state)).await.unwrap_err();
        assert_eq!(again.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reject_sends_user_rejected() {
        let (state, mut harness) = state();
        let request_id = open(&state, &mut harness, "a").await;

        let Json(body) = reject(Path(request_id), State(state)).await.unwrap();
        assert_eq!(body.response["error"]["code"], codes::USER_REJECTED);
    }
}
