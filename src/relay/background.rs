// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Background Relay
//!
//! The background half of the relay bus. Content scripts can be tampered
//! with, so every forwarded request is checked again here before it reaches
//! the correlator:
//!
//! 1. The runtime-stamped sender must carry a tab id and an origin
//!    (`origin`, falling back to `url`).
//! 2. The payload must still be a valid request envelope.
//! 3. The Origin Gatekeeper must allow the origin.
//! 4. The Rate Limiter must admit it. Unknown origins never reach this step,
//!    so they never allocate a bucket.
//!
//! Policy failures are answered with an error for the same RPC id so the
//! page's pending call settles instead of waiting for its timeout.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{RuntimeMessage, TabId};
use super::runtime::ExtensionRuntime;
use crate::confirm::{ConfirmationCorrelator, CorrelatorError};
use crate::logging::sanitize_for_log;
use crate::policy::{OriginPolicy, RateLimiter};
use crate::rpc::{validate_envelope, RpcError, RpcResponse};
use crate::storage::{AuditEvent, AuditEventType, AuditLog};

/// What happened to one inbound runtime message.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Ignored without a response.
    Dropped,
    /// Answered with an error for the request id.
    Rejected(RpcError),
    /// Handed to the correlator; the surface is open.
    Forwarded { request_id: String },
}

pub struct BackgroundRelay {
    runtime: Arc<ExtensionRuntime>,
    policy: OriginPolicy,
    limiter: Arc<RateLimiter>,
    correlator: Arc<ConfirmationCorrelator>,
    audit: Arc<AuditLog>,
}

impl BackgroundRelay {
    pub fn new(
        runtime: Arc<ExtensionRuntime>,
        policy: OriginPolicy,
        limiter: Arc<RateLimiter>,
        correlator: Arc<ConfirmationCorrelator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            runtime,
            policy,
            limiter,
            correlator,
            audit,
        }
    }

    /// Process the runtime inbox until shutdown or until every sender is gone.
    pub async fn run(self, mut inbox: mpsc::Receiver<RuntimeMessage>, shutdown: CancellationToken) {
        info!(
            allowed_origins = ?self.policy.allowed(),
            mode = ?self.policy.mode(),
            "Background relay starting"
        );

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => {
                        let disposition = self.handle(message);
                        debug!(disposition = ?disposition, "Runtime message handled");
                    }
                    None => {
                        debug!("Runtime inbox closed");
                        return;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Background relay shutting down");
                    return;
                }
            }
        }
    }

    pub fn handle(&self, message: RuntimeMessage) -> Disposition {
        let sender = message.sender;
        if sender.extension_id != self.runtime.extension_id() {
            warn!(sender = %sender.extension_id, "Ignoring message from foreign extension");
            return Disposition::Dropped;
        }
        let Some(tab_id) = sender.tab_id else {
            warn!("Ignoring request without sender tab");
            return Disposition::Dropped;
        };
        let origin = sender.origin_or_url().map(str::to_string);

        let request = match validate_envelope(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    tab_id,
                    reason = %e,
                    payload = %sanitize_for_log(&message.payload),
                    "Invalid request reached background"
                );
                return match request_id(&message.payload) {
                    Some(id) => self.respond(tab_id, id, RpcError::invalid_request("Invalid request")),
                    None => Disposition::Dropped,
                };
            }
        };

        if let Err(rejection) = self.policy.check(origin.as_deref()) {
            warn!(tab_id, origin = ?origin, reason = %rejection, "Origin not allowed");
            let mut event = AuditEvent::new(AuditEventType::OriginRejected)
                .with_tab(tab_id)
                .failed(rejection.to_string());
            if let Some(origin) = &origin {
                event = event.with_origin(origin.as_str());
            }
            self.audit.record(event);
            return self.respond(tab_id, request.id, RpcError::origin_not_allowed());
        }
        // The gatekeeper denies missing origins.
        let origin = origin.unwrap_or_default();

        if !self.limiter.check(&origin) {
            warn!(tab_id, origin = %origin, "Rate limit exceeded");
            self.audit.record(
                AuditEvent::new(AuditEventType::RateLimited)
                    .with_origin(origin.as_str())
                    .with_tab(tab_id)
                    .failed("rate limit exceeded"),
            );
            return self.respond(tab_id, request.id, RpcError::rate_limited());
        }

        let rpc_id = request.id.clone();
        match self.correlator.open(request, tab_id, &origin) {
            Ok(launch) => Disposition::Forwarded {
                request_id: launch.request_id,
            },
            Err(CorrelatorError::DuplicateRequest(id)) => {
                warn!(tab_id, rpc_id = %id, "Request id reused while in flight");
                self.respond(tab_id, rpc_id, RpcError::invalid_request("Duplicate request id"))
            }
            Err(e) => {
                warn!(tab_id, error = %e, "Failed to open confirmation");
                self.respond(tab_id, rpc_id, RpcError::internal())
            }
        }
    }

    fn respond(&self, tab_id: TabId, id: String, error: RpcError) -> Disposition {
        let response = RpcResponse::failure(Some(id), error.clone());
        if let Err(e) = self.runtime.send_to_tab(tab_id, response.to_value()) {
            warn!(tab_id, error = %e, "Failed to send error response to tab");
        }
        Disposition::Rejected(error)
    }
}

/// The id of a payload too broken to be a request, if it still has one.
fn request_id(payload: &Value) -> Option<String> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiToken;
    use crate::clock::ManualClock;
    use crate::confirm::{ChannelSurface, ConfirmationLaunch, MemorySessionStore};
    use crate::policy::RateLimitConfig;
    use crate::relay::{MessageSender, TabPort};
    use crate::rpc::codes;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;

    const ORIGIN: &str = "http://localhost:3000";

    struct Fixture {
        relay: BackgroundRelay,
        runtime: Arc<ExtensionRuntime>,
        limiter: Arc<RateLimiter>,
        launches: mpsc::Receiver<ConfirmationLaunch>,
        _inbox: mpsc::Receiver<RuntimeMessage>,
    }

    fn fixture() -> Fixture {
        let (runtime, inbox) = ExtensionRuntime::new("wallet-ext");
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig {
                max_requests: 30,
                window: Duration::from_secs(60),
                capacity: 16,
            },
            clock,
        ));
        let (surface, launches) = ChannelSurface::new();
        let audit = Arc::new(AuditLog::disabled());
        let correlator = Arc::new(ConfirmationCorrelator::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(surface),
            Url::parse("http://127.0.0.1:8080/confirm").unwrap(),
            runtime.clone(),
            ApiToken::generate().unwrap(),
            audit.clone(),
        ));
        let relay = BackgroundRelay::new(
            runtime.clone(),
            OriginPolicy::new(["http://localhost", "http://127.0.0.1"]),
            limiter.clone(),
            correlator,
            audit,
        );
        Fixture {
            relay,
            runtime,
            limiter,
            launches,
            _inbox: inbox,
        }
    }

    fn message(port: &TabPort, origin: Option<&str>, payload: Value) -> RuntimeMessage {
        RuntimeMessage {
            sender: MessageSender {
                extension_id: port.extension_id().to_string(),
                tab_id: Some(port.tab_id()),
                origin: origin.map(str::to_string),
                url: None,
            },
            payload,
        }
    }

    fn request(id: &str) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "method": "getAddresses", "params": {} })
    }

    async fn error_code(port: &mut TabPort) -> i64 {
        let message = port.recv().await.unwrap();
        let response: RpcResponse = serde_json::from_value(message.payload).unwrap();
        response.into_result().unwrap_err().code
    }

    #[tokio::test]
    async fn allowed_request_opens_confirmation() {
        let mut fx = fixture();
        let port = fx.runtime.connect_tab(ORIGIN, "http://localhost:3000/").unwrap();

        let disposition = fx.relay.handle(message(&port, Some(ORIGIN), request("a")));
        let Disposition::Forwarded { request_id } = disposition.clone() else {
            panic!("expected forward, got {disposition:?}");
        };
        assert_eq!(fx.launches.recv().await.unwrap().request_id, request_id);
        assert_eq!(fx.limiter.bucket(ORIGIN).unwrap().count, 1);
    }

    #[tokio::test]
    async fn disallowed_origin_is_answered_without_bucket() {
        let mut fx = fixture();
        let mut port = fx.runtime.connect_tab("https://evil.example", "https://evil.example/").unwrap();

        let disposition = fx
            .relay
            .handle(message(&port, Some("https://evil.example"), request("a")));
        assert_eq!(disposition, Disposition::Rejected(RpcError::origin_not_allowed()));
        assert_eq!(error_code(&mut port).await, codes::INVALID_REQUEST);
        assert!(fx.limiter.is_empty());
        assert!(fx.launches.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_origin_falls_back_to_url_then_denies() {
        let fx = fixture();
        let mut port = fx.runtime.connect_tab(ORIGIN, ORIGIN).unwrap();

        let mut with_url = message(&port, None, request("a"));
        with_url.sender.url = Some("http://localhost:3000/page".to_string());
        assert!(matches!(fx.relay.handle(with_url), Disposition::Forwarded { .. }));

        let bare = message(&port, None, request("b"));
        assert_eq!(
            fx.relay.handle(bare),
            Disposition::Rejected(RpcError::origin_not_allowed())
        );
        assert_eq!(error_code(&mut port).await, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn thirty_first_request_is_rate_limited() {
        let fx = fixture();
        let mut port = fx.runtime.connect_tab(ORIGIN, ORIGIN).unwrap();

        for i in 0..30 {
            let disposition = fx.relay.handle(message(&port, Some(ORIGIN), request(&format!("r{i}"))));
            assert!(matches!(disposition, Disposition::Forwarded { .. }), "request {i}");
        }
        let disposition = fx.relay.handle(message(&port, Some(ORIGIN), request("r30")));
        assert_eq!(disposition, Disposition::Rejected(RpcError::rate_limited()));
        assert_eq!(error_code(&mut port).await, codes::SERVER_ERROR);
    }

    #[tokio::test]
    async fn reused_id_is_invalid() {
        let fx = fixture();
        let mut port = fx.runtime.connect_tab(ORIGIN, ORIGIN).unwrap();

        assert!(matches!(
            fx.relay.handle(message(&port, Some(ORIGIN), request("same"))),
            Disposition::Forwarded { .. }
        ));
        assert!(matches!(
            fx.relay.handle(message(&port, Some(ORIGIN), request("same"))),
            Disposition::Rejected(_)
        ));
        assert_eq!(error_code(&mut port).await, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn malformed_payloads() {
        let fx = fixture();
        let mut port = fx.runtime.connect_tab(ORIGIN, ORIGIN).unwrap();

        assert_eq!(
            fx.relay.handle(message(&port, Some(ORIGIN), json!({ "id": "x", "method": "getAddresses" }))),
            Disposition::Rejected(RpcError::invalid_request("Invalid request"))
        );
        assert_eq!(error_code(&mut port).await, codes::INVALID_REQUEST);

        assert_eq!(
            fx.relay.handle(message(&port, Some(ORIGIN), json!({ "jsonrpc": "2.0" }))),
            Disposition::Dropped
        );
    }

    #[tokio::test]
    async fn tabless_and_foreign_senders_are_dropped() {
        let fx = fixture();
        let port = fx.runtime.connect_tab(ORIGIN, ORIGIN).unwrap();

        let mut no_tab = message(&port, Some(ORIGIN), request("a"));
        no_tab.sender.tab_id = None;
        assert_eq!(fx.relay.handle(no_tab), Disposition::Dropped);

        let mut foreign = message(&port, Some(ORIGIN), request("b"));
        foreign.sender.extension_id = "other-ext".to_string();
        assert_eq!(fx.relay.handle(foreign), Disposition::Dropped);
        assert!(fx.limiter.is_empty());
    }
}
