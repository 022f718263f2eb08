// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User decisions on pending confirmations.

use tracing::{info, warn};

use super::correlator::ConfirmationCorrelator;
use super::store::PendingConfirmation;
use super::CorrelatorError;
use crate::handler::{HandlerError, MethodCall, MethodHandler};
use crate::relay::RelayError;
use crate::rpc::{RpcError, RpcResponse};
use crate::storage::{AuditEvent, AuditEventType};
use crate::vault::{ActivitySignal, SecretSeed, SessionVault};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Approval needs the seed; the request stays pending.
    #[error("vault is locked")]
    Locked,
    #[error("no pending confirmation {0}")]
    NotFound(String),
    #[error(transparent)]
    Correlator(#[from] CorrelatorError),
}

/// The response produced for a decision and whether it reached the tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub response: RpcResponse,
    pub delivered: bool,
}

/// Map a handler failure to the error the page sees. Internal details stay
/// in the log.
pub fn normalize_handler_error(method: &str, error: HandlerError) -> RpcError {
    match error {
        HandlerError::Unsupported(_) => RpcError::method_not_supported(method),
        HandlerError::InvalidParams(message) => RpcError::invalid_params(message),
        HandlerError::Failed(detail) => {
            warn!(method, error = %detail, "Method handler failed");
            RpcError::unknown()
        }
    }
}

impl ConfirmationCorrelator {
    /// Approve a stored confirmation: run the method against the unlocked
    /// seed and deliver its outcome.
    pub async fn approve(
        &self,
        request_id: &str,
        vault: &SessionVault,
        handler: &dyn MethodHandler,
    ) -> Result<Resolution, ResolveError> {
        let seed = vault.mnemonic().await.ok_or(ResolveError::Locked)?;
        let pending = self
            .take(request_id)?
            .ok_or_else(|| ResolveError::NotFound(request_id.to_string()))?;
        self.run_approved(pending, seed, vault, handler).await
    }

    /// Approve a confirmation rebuilt from a fallback launch URL. Fails with
    /// `NotFound` once it was answered or expired.
    pub async fn approve_pending(
        &self,
        pending: PendingConfirmation,
        vault: &SessionVault,
        handler: &dyn MethodHandler,
    ) -> Result<Resolution, ResolveError> {
        let seed = vault.mnemonic().await.ok_or(ResolveError::Locked)?;
        if !self.is_awaiting(&pending) {
            return Err(ResolveError::NotFound(pending.request_id));
        }
        self.run_approved(pending, seed, vault, handler).await
    }

    async fn run_approved(
        &self,
        pending: PendingConfirmation,
        seed: SecretSeed,
        vault: &SessionVault,
        handler: &dyn MethodHandler,
    ) -> Result<Resolution, ResolveError> {
        vault.record_activity(ActivitySignal::Click).await;

        let request = &pending.payload;
        let outcome = handler
            .handle(MethodCall {
                method: &request.method,
                params: &request.params,
                origin: &pending.origin,
                seed: &seed,
            })
            .await;
        drop(seed);

        let response = match outcome {
            Ok(result) => RpcResponse::success(request.id.clone(), result),
            Err(e) => RpcResponse::failure(
                Some(request.id.clone()),
                normalize_handler_error(&request.method, e),
            ),
        };

        let delivered = self.send(&pending, &response)?;
        info!(
            request_id = %pending.request_id,
            method = %request.method,
            success = !response.is_error(),
            delivered,
            "Confirmation approved"
        );
        let mut event = AuditEvent::new(AuditEventType::ConfirmationApproved)
            .with_origin(pending.origin.as_str())
            .with_tab(pending.tab_id)
            .with_request(pending.request_id.as_str())
            .with_details(serde_json::json!({ "method": request.method }));
        if response.is_error() {
            event = event.failed("method handler error");
        }
        self.audit.record(event);

        Ok(Resolution { response, delivered })
    }

    /// Reject a stored confirmation with a user-rejected error.
    pub fn reject(&self, request_id: &str) -> Result<Resolution, ResolveError> {
        let pending = self
            .take(request_id)?
            .ok_or_else(|| ResolveError::NotFound(request_id.to_string()))?;
        self.reject_pending(pending)
    }

    /// Reject a confirmation rebuilt from a fallback launch URL.
    pub fn reject_pending(&self, pending: PendingConfirmation) -> Result<Resolution, ResolveError> {
        if !self.is_awaiting(&pending) {
            return Err(ResolveError::NotFound(pending.request_id));
        }
        let response =
            RpcResponse::failure(Some(pending.payload.id.clone()), RpcError::user_rejected());
        let delivered = self.send(&pending, &response)?;

        info!(request_id = %pending.request_id, delivered, "Confirmation rejected");
        self.audit.record(
            AuditEvent::new(AuditEventType::ConfirmationRejected)
                .with_origin(pending.origin.as_str())
                .with_tab(pending.tab_id)
                .with_request(pending.request_id.as_str()),
        );
        Ok(Resolution { response, delivered })
    }

    /// A closed tab is not an error for the decision; the response is
    /// simply not delivered.
    fn send(
        &self,
        pending: &PendingConfirmation,
        response: &RpcResponse,
    ) -> Result<bool, ResolveError> {
        match self.deliver(pending, response) {
            Ok(delivered) => Ok(delivered),
            Err(CorrelatorError::Relay(e @ (RelayError::TabNotConnected(_) | RelayError::ChannelClosed))) => {
                warn!(
                    request_id = %pending.request_id,
                    tab_id = pending.tab_id,
                    error = %e,
                    "Source tab gone, response dropped"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
