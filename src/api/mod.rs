// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Surface API
//!
//! Localhost HTTP API the popup UI drives. Errors are `{"error": "..."}`.
//! Every `/v1` route needs the surface bearer token, and CORS admits only
//! the confirmation surface's origin.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | liveness and vault state |
//! | `/v1/vault` | status, create, delete, unlock, lock, activity |
//! | `/v1/confirmations/{request_id}` | pending context, approve, reject |
//! | `POST /v1/admin/rate-limits/reset` | clear limiter buckets |

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth,
    confirm::PendingConfirmation,
    state::AppState,
    vault::{ActivitySignal, LockState, VaultStatus},
};

pub mod admin;
pub mod confirmations;
pub mod health;
pub mod vault;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/vault",
            get(vault::get_status)
                .post(vault::create_wallet)
                .delete(vault::delete_wallet),
        )
        .route("/vault/unlock", post(vault::unlock))
        .route("/vault/lock", post(vault::lock))
        .route("/vault/activity", post(vault::record_activity))
        .route(
            "/confirmations/{request_id}",
            get(confirmations::get_confirmation),
        )
        .route(
            "/confirmations/{request_id}/approve",
            post(confirmations::approve),
        )
        .route(
            "/confirmations/{request_id}/reject",
            post(confirmations::reject),
        )
        .route("/admin/rate-limits/reset", post(admin::reset_rate_limits))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_surface_token,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors(&state.surface_origin))
        .with_state(state)
}

/// CORS for the surface origin only. An origin that is not a valid header
/// value admits nobody.
fn cors(surface_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    match HeaderValue::from_str(surface_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => layer,
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        health::health,
        vault::get_status,
        vault::create_wallet,
        vault::delete_wallet,
        vault::unlock,
        vault::lock,
        vault::record_activity,
        confirmations::get_confirmation,
        confirmations::approve,
        confirmations::reject,
        admin::reset_rate_limits
    ),
    components(
        schemas(
            health::HealthResponse,
            health::HealthChecks,
            VaultStatus,
            LockState,
            ActivitySignal,
            vault::CreateWalletRequest,
            vault::UnlockRequest,
            vault::ActivityRequest,
            vault::ActivityResponse,
            PendingConfirmation,
            confirmations::ResolutionResponse,
            admin::ResetRateLimitsRequest,
            admin::ResetRateLimitsResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Vault", description = "Session vault lifecycle"),
        (name = "Confirmations", description = "Pending request decisions"),
        (name = "Admin", description = "Operational tooling")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use crate::auth::ApiToken;
    use crate::clock::SystemClock;
    use crate::confirm::{ChannelSurface, ConfirmationCorrelator, ConfirmationLaunch, MemorySessionStore};
    use crate::handler::{HandlerError, MethodCall, MethodHandler};
    use crate::policy::{RateLimitConfig, RateLimiter};
    use crate::relay::{ExtensionRuntime, TabPort};
    use crate::state::AppState;
    use crate::storage::{AuditLog, MemoryStore};
    use crate::vault::{SessionVault, VaultConfig};

    pub const ORIGIN: &str = "http://localhost:3000";
    pub const SURFACE_ORIGIN: &str = "http://127.0.0.1:8080";
    pub const TOKEN: &str = "test-surface-token-0123456789abcdef";

    pub fn bearer() -> String {
        format!("Bearer {TOKEN}")
    }

    /// The tab and popup ends of a test [`AppState`].
    pub struct Harness {
        pub port: TabPort,
        pub launches: mpsc::Receiver<ConfirmationLaunch>,
    }

    struct Addresses;

    #[async_trait]
    impl MethodHandler for Addresses {
        async fn handle(&self, _call: MethodCall<'_>) -> Result<Value, HandlerError> {
            Ok(json!({ "addresses": [{ "symbol": "STX", "address": "SP000" }] }))
        }
    }

    pub fn state() -> (AppState, Harness) {
        let (runtime, _inbox) = ExtensionRuntime::new("wallet-relay");
        let port = runtime
            .connect_tab(ORIGIN, "http://localhost:3000/")
            .unwrap();
        let (surface, launches) = ChannelSurface::new();
        let audit = Arc::new(AuditLog::disabled());
        let correlator = Arc::new(ConfirmationCorrelator::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(surface),
            Url::parse("http://127.0.0.1:8080/confirm").unwrap(),
            runtime.clone(),
            ApiToken::from_configured(TOKEN).unwrap(),
            audit.clone(),
        ));
        let vault = SessionVault::new(
            Arc::new(MemoryStore::new()),
            SystemClock::shared(),
            VaultConfig::default(),
            audit,
            CancellationToken::new(),
        )
        .unwrap();
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::default(),
            SystemClock::shared(),
        ));

        let state = AppState::new(vault, correlator, limiter, Arc::new(Addresses));
        (
            state,
            Harness {
                port,
                launches,
            },
        )
    }
}
