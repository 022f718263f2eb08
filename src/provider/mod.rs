// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Provider Façade
//!
//! The only wallet API a page sees. `request(method, params)` never touches
//! the extension directly: it dispatches a document event for the content
//! relay and waits for a window message answering the same id.
//!
//! Each call settles exactly once, on whichever comes first:
//!
//! | Outcome | Result |
//! |---------|--------|
//! | same-origin response with the call's id | its `result`, or its `error` |
//! | `timeout` elapsed | `-32000 Request timeout` |
//!
//! The correlation table entry is removed when the call settles or its
//! future is dropped, so late responses find nothing to resolve.

pub mod discovery;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

pub use discovery::{ProviderDescriptor, ProviderRegistry, PROVIDER_GLOBAL};

use crate::page::{PageContext, WindowMessage, WINDOW_MESSAGE_CAPACITY};
use crate::relay::REQUEST_EVENT;
use crate::rpc::{is_supported, RpcError, RpcRequest, RpcResponse};

/// Wait for a response before failing with a timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingTable = Arc<Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>>;

pub struct ProviderFacade {
    page: PageContext,
    timeout: Duration,
    pending: PendingTable,
    _listener: DropGuard,
}

impl ProviderFacade {
    /// Create the façade for `page`, start its window listener, and register
    /// it in the page's provider registry. Must be called inside a tokio
    /// runtime.
    pub fn install(
        page: PageContext,
        registry: &ProviderRegistry,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Arc<Self> {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let listener = shutdown.child_token();
        tokio::spawn(listen(
            page.origin().to_string(),
            page.subscribe(),
            pending.clone(),
            listener.clone(),
        ));

        let facade = Arc::new(Self {
            page,
            timeout,
            pending,
            _listener: listener.drop_guard(),
        });
        registry.register(
            PROVIDER_GLOBAL,
            facade.clone(),
            ProviderDescriptor::stacks_wallet(),
        );
        facade
    }

    /// Call a wallet method.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if !is_supported(method) {
            return Err(RpcError::method_not_supported(method));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| RpcError::internal())?
            .insert(id.clone(), tx);
        let _entry = PendingGuard {
            table: &self.pending,
            id: &id,
        };

        let envelope = RpcRequest::new(id.clone(), method, params);
        let detail = serde_json::to_value(&envelope).map_err(|_| RpcError::internal())?;
        if !self.page.dispatch_event(REQUEST_EVENT, detail) {
            debug!(id = %id, "Request event not queued");
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => {
                warn!(id = %id, "Provider listener stopped");
                Err(RpcError::internal())
            }
            Err(_) => Err(RpcError::timeout()),
        }
    }

    /// Calls waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

/// Removes a call's correlation entry however the call ends.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.table.lock() {
            pending.remove(self.id);
        }
    }
}

/// The page's window `message` listener for this façade. Messages lost to
/// lag (more than [`WINDOW_MESSAGE_CAPACITY`] behind) are skipped, and any
/// call whose response was among them settles by timeout.
async fn listen(
    origin: String,
    mut messages: broadcast::Receiver<WindowMessage>,
    pending: PendingTable,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Ok(message) => settle(&origin, &pending, message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Provider listener lagged behind window messages");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = shutdown.cancelled() => {
                debug!("Provider listener shutting down");
                return;
            }
        }
    }
}

fn settle(origin: &str, pending: &PendingTable, message: WindowMessage) {
    if message.origin != origin {
        return;
    }
    let Ok(response) = serde_json::from_value::<RpcResponse>(message.data) else {
        return;
    };
    let Some(id) = response.id.as_deref() else {
        return;
    };
    let waiter = match pending.lock() {
        Ok(mut pending) => pending.remove(id),
        Err(_) => None,
    };
    if let Some(waiter) = waiter {
        // The caller may have just given up; nothing else to do then.
        let _ = waiter.send(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::codes;
    use serde_json::json;

    const ORIGIN: &str = "http://localhost:3000";

    struct Fixture {
        page: PageContext,
        events: tokio::sync::mpsc::Receiver<crate::relay::PageEvent>,
        registry: ProviderRegistry,
        facade: Arc<ProviderFacade>,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let (page, events) = PageContext::new(ORIGIN, "http://localhost:3000/");
        let registry = ProviderRegistry::new();
        let facade =
            ProviderFacade::install(page.clone(), &registry, timeout, &CancellationToken::new());
        Fixture {
            page,
            events,
            registry,
            facade,
        }
    }

    #[tokio::test]
    async fn unsupported_method_fails_without_dispatch() {
        let mut fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let err = fx.facade.request("eth_sendTransaction", json!({})).await.unwrap_err();
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method eth_sendTransaction is not supported");
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn response_settles_matching_call() {
        let mut fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let facade = fx.facade.clone();
        let call = tokio::spawn(async move { facade.request("getAddresses", json!({})).await });

        let event = fx.events.recv().await.unwrap();
        assert_eq!(event.name, REQUEST_EVENT);
        let id = event.detail["id"].as_str().unwrap().to_string();

        // Foreign origin, unknown id and a malformed payload are all ignored.
        let answer = json!({ "jsonrpc": "2.0", "id": id, "result": { "ok": true } });
        fx.page.post_message("https://evil.example", answer.clone(), "*");
        fx.page.post_message(
            ORIGIN,
            json!({ "jsonrpc": "2.0", "id": "other", "result": 1 }),
            ORIGIN,
        );
        fx.page.post_message(ORIGIN, json!({ "jsonrpc": "2.0", "id": id }), ORIGIN);
        fx.page.post_message(ORIGIN, answer, ORIGIN);

        assert_eq!(call.await.unwrap().unwrap(), json!({ "ok": true }));
        assert_eq!(fx.facade.pending_requests(), 0);
    }

    #[tokio::test]
    async fn error_response_rejects_call() {
        let mut fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let facade = fx.facade.clone();
        let call = tokio::spawn(async move { facade.request("stx_signMessage", json!({})).await });

        let id = fx.events.recv().await.unwrap().detail["id"]
            .as_str()
            .unwrap()
            .to_string();
        fx.page.post_message(
            ORIGIN,
            json!({ "jsonrpc": "2.0", "id": id, "error": { "code": 4001, "message": "User rejected the request" } }),
            ORIGIN,
        );
        assert_eq!(call.await.unwrap().unwrap_err().code, codes::USER_REJECTED);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_settles_once_and_late_response_is_ignored() {
        let mut fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let facade = fx.facade.clone();
        let call = tokio::spawn(async move { facade.request("getAddresses", json!({})).await });

        let id = fx.events.recv().await.unwrap().detail["id"]
            .as_str()
            .unwrap()
            .to_string();
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, RpcError::timeout());
        assert_eq!(fx.facade.pending_requests(), 0);

        fx.page.post_message(
            ORIGIN,
            json!({ "jsonrpc": "2.0", "id": id, "result": 1 }),
            ORIGIN,
        );
        tokio::task::yield_now().await;
        assert_eq!(fx.facade.pending_requests(), 0);
    }

    #[tokio::test]
    async fn dropped_call_removes_its_entry() {
        let fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let facade = fx.facade.clone();
        let call = tokio::spawn(async move { facade.request("getAddresses", json!({})).await });
        while fx.facade.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }
        call.abort();
        let _ = call.await;
        assert_eq!(fx.facade.pending_requests(), 0);
    }

    #[tokio::test]
    async fn response_survives_a_burst_of_page_messages() {
        let mut fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        let facade = fx.facade.clone();
        let call = tokio::spawn(async move { facade.request("getAddresses", json!({})).await });
        let id = fx.events.recv().await.unwrap().detail["id"]
            .as_str()
            .unwrap()
            .to_string();

        for n in 0..WINDOW_MESSAGE_CAPACITY - 1 {
            fx.page.post_message(ORIGIN, json!({ "noise": n }), ORIGIN);
        }
        fx.page.post_message(
            ORIGIN,
            json!({ "jsonrpc": "2.0", "id": id, "result": "ok" }),
            ORIGIN,
        );
        assert_eq!(call.await.unwrap().unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn install_registers_global_and_descriptor() {
        let fx = fixture(DEFAULT_REQUEST_TIMEOUT);
        assert!(fx.registry.get(PROVIDER_GLOBAL).is_some());
        let providers = fx.registry.providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "Stacks Wallet");
    }
}
