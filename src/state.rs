// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::ApiToken;
use crate::confirm::{surface_origin, ConfirmationCorrelator};
use crate::handler::MethodHandler;
use crate::policy::RateLimiter;
use crate::vault::SessionVault;

/// Shared handles for the confirmation surface API. The API token and
/// allowed origin are those the correlator hands to the surface.
#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<SessionVault>,
    pub correlator: Arc<ConfirmationCorrelator>,
    pub limiter: Arc<RateLimiter>,
    pub handler: Arc<dyn MethodHandler>,
    /// Bearer token every `/v1` request must present.
    pub api_token: ApiToken,
    /// The only origin CORS lets through.
    pub surface_origin: String,
}

impl AppState {
    pub fn new(
        vault: Arc<SessionVault>,
        correlator: Arc<ConfirmationCorrelator>,
        limiter: Arc<RateLimiter>,
        handler: Arc<dyn MethodHandler>,
    ) -> Self {
        Self {
            api_token: correlator.api_token().clone(),
            surface_origin: surface_origin(correlator.base_url()),
            vault,
            correlator,
            limiter,
            handler,
        }
    }
}
