// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault endpoints for the confirmation surface.
//!
//! Unlocking never returns the seed; it stays inside the background context
//! and is only used to run approved requests.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::{
    error::ApiError,
    state::AppState,
    vault::{ActivitySignal, SecretSeed, VaultStatus},
};

// ========== Request/Response Types ==========

/// Provision a wallet. The mnemonic is encrypted immediately and never stored
/// in plaintext.
#[derive(Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub mnemonic: String,
    /// Six-digit PIN.
    pub pin: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UnlockRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivityRequest {
    pub signal: ActivitySignal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityResponse {
    /// Whether the signal extended an unlocked session.
    pub applied: bool,
}

// ========== Handlers ==========

#[utoipa::path(
    get,
    path = "/v1/vault",
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses((status = 200, body = VaultStatus))
)]
pub async fn get_status(State(state): State<AppState>) -> Json<VaultStatus> {
    Json(state.vault.status().await)
}

#[utoipa::path(
    post,
    path = "/v1/vault",
    request_body = CreateWalletRequest,
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = VaultStatus),
        (status = 400, description = "PIN is not 6 digits")
    )
)]
pub async fn create_wallet(
    State(state): State<AppState>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<VaultStatus>), ApiError> {
    let CreateWalletRequest { mnemonic, pin } = request;
    let pin = Zeroizing::new(pin);
    if mnemonic.trim().is_empty() {
        return Err(ApiError::bad_request("mnemonic must not be empty"));
    }
    state
        .vault
        .create_wallet(SecretSeed::from(mnemonic), &pin)
        .await?;
    Ok((StatusCode::CREATED, Json(state.vault.status().await)))
}

#[utoipa::path(
    delete,
    path = "/v1/vault",
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses((status = 204))
)]
pub async fn delete_wallet(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.vault.delete_wallet().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/vault/unlock",
    request_body = UnlockRequest,
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = VaultStatus),
        (status = 400, description = "PIN is not 6 digits"),
        (status = 401, description = "Wrong PIN"),
        (status = 404, description = "No wallet"),
        (status = 423, description = "Locked out")
    )
)]
pub async fn unlock(
    State(state): State<AppState>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<VaultStatus>, ApiError> {
    let pin = Zeroizing::new(request.pin);
    state.vault.unlock(&pin).await?;
    Ok(Json(state.vault.status().await))
}

#[utoipa::path(
    post,
    path = "/v1/vault/lock",
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses((status = 200, body = VaultStatus))
)]
pub async fn lock(State(state): State<AppState>) -> Json<VaultStatus> {
    state.vault.lock().await;
    Json(state.vault.status().await)
}

#[utoipa::path(
    post,
    path = "/v1/vault/activity",
    request_body = ActivityRequest,
    tag = "Vault",
    security(("bearer_auth" = [])),
    responses((status = 200, body = ActivityResponse))
)]
pub async fn record_activity(
    State(state): State<AppState>,
    Json(request): Json<ActivityRequest>,
) -> Json<ActivityResponse> {
    let applied = state.vault.record_activity(request.signal).await;
    Json(ActivityResponse { applied })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::state;
    use crate::vault::LockState;

    const PIN: &str = "123456";

    fn create(pin: &str) -> Json<CreateWalletRequest> {
        Json(CreateWalletRequest {
            mnemonic: "abandon ability able about".to_string(),
            pin: pin.to_string(),
        })
    }

    #[tokio::test]
    async fn create_then_unlock_and_lock() {
        let (state, _harness) = state();

        let (status, Json(created)) = create_wallet(State(state.clone()), create(PIN))
            .await
            .expect("wallet creation succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.has_wallet);
        assert_eq!(created.state, LockState::Locked);

        let Json(unlocked) = unlock(
            State(state.clone()),
            Json(UnlockRequest {
                pin: PIN.to_string(),
            }),
        )
        .await
        .expect("unlock succeeds");
        assert_eq!(unlocked.state, LockState::Unlocked);

        let Json(activity) = record_activity(
            State(state.clone()),
            Json(ActivityRequest {
                signal: ActivitySignal::Scroll,
            }),
        )
        .await;
        assert!(activity.applied);

        let Json(locked) = lock(State(state.clone())).await;
        assert_eq!(locked.state, LockState::Locked);
    }

    #[tokio::test]
    async fn unlock_errors_map_to_statuses() {
        let (state, _harness) = state();
        let attempt = |pin: &str| {
            let state = state.clone();
            let pin = pin.to_string();
            async move { unlock(State(state), Json(UnlockRequest { pin })).await }
        };

        assert_eq!(attempt("12ab56").await.unwrap_err().status, StatusCode::BAD_REQUEST);
        assert_eq!(attempt(PIN).await.unwrap_err().status, StatusCode::NOT_FOUND);

        create_wallet(State(state.clone()), create(PIN)).await.unwrap();
        let wrong = attempt("000000").await.unwrap_err();
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert!(wrong.message.contains("2 attempts remaining"));
    }

    #[tokio::test]
    async fn create_rejects_bad_pin_and_empty_mnemonic() {
        let (state, _harness) = state();
        let err = create_wallet(State(state.clone()), create("12345")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = create_wallet(
            State(state.clone()),
            Json(CreateWalletRequest {
                mnemonic: "  ".to_string(),
                pin: PIN.to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(!state.vault.status().await.has_wallet);
    }

    #[tokio::test]
    async fn delete_resets_vault() {
        let (state, _harness) = state();
        create_wallet(State(state.clone()), create(PIN)).await.unwrap();
        let status = delete_wallet(State(state.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!state.vault.status().await.has_wallet);
    }
}
