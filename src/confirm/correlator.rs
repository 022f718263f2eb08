// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confirmation correlator: opens the surface for an accepted request and is
//! the single place its response is produced.
//!
//! A request nobody decides is dropped once it is older than the expiry
//! (the provider request timeout by default): by then the page has already
//! given up on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::store::{session_key, PendingConfirmation, SessionStore};
use super::surface::{
    launch_url, ConfirmationLaunch, ConfirmationSurface, SURFACE_HEIGHT, SURFACE_WIDTH,
};
use super::CorrelatorError;
use crate::auth::ApiToken;
use crate::clock::{SharedClock, SystemClock};
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::relay::{ExtensionRuntime, TabId};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::storage::{AuditEvent, AuditEventType, AuditLog};

type FlightKey = (TabId, String);

/// An opened request awaiting its decision.
#[derive(Debug, Clone)]
struct InFlight {
    request_id: String,
    opened: Instant,
}

pub struct ConfirmationCorrelator {
    store: Arc<dyn SessionStore>,
    surface: Arc<dyn ConfirmationSurface>,
    base_url: Url,
    runtime: Arc<ExtensionRuntime>,
    api_token: ApiToken,
    pub(super) audit: Arc<AuditLog>,
    clock: SharedClock,
    expiry: Duration,
    /// Keyed by `(tab, rpc id)`: opened and not yet answered.
    in_flight: Mutex<HashMap<FlightKey, InFlight>>,
}

impl ConfirmationCorrelator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        surface: Arc<dyn ConfirmationSurface>,
        base_url: Url,
        runtime: Arc<ExtensionRuntime>,
        api_token: ApiToken,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            surface,
            base_url,
            runtime,
            api_token,
            audit,
            clock: SystemClock::shared(),
            expiry: DEFAULT_REQUEST_TIMEOUT,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Expire undecided requests after `expiry`, measured on `clock`.
    pub fn with_expiry(mut self, expiry: Duration, clock: SharedClock) -> Self {
        self.expiry = expiry;
        self.clock = clock;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_token(&self) -> &ApiToken {
        &self.api_token
    }

    /// Persist the request and open the confirmation surface for it.
    ///
    /// The request id is freshly generated and unrelated to the RPC id. A
    /// store failure falls back to carrying the context in the launch URL.
    pub fn open(
        &self,
        request: RpcRequest,
        tab_id: TabId,
        origin: &str,
    ) -> Result<ConfirmationLaunch, CorrelatorError> {
        let flight = (tab_id, request.id.clone());
        let request_id = uuid::Uuid::new_v4().to_string();
        {
            let mut in_flight = self.in_flight.lock().map_err(|_| CorrelatorError::Poisoned)?;
            if in_flight.contains_key(&flight) {
                return Err(CorrelatorError::DuplicateRequest(request.id));
            }
            in_flight.insert(
                flight.clone(),
                InFlight {
                    request_id: request_id.clone(),
                    opened: self.clock.now(),
                },
            );
        }

        let pending = PendingConfirmation {
            request_id: request_id.clone(),
            payload: request,
            tab_id,
            origin: origin.to_string(),
            created_at: Utc::now(),
        };

        let key = session_key(&request_id);
        let stored = match self.store.put(&key, pending.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Session storage not available, using URL params");
                false
            }
        };

        let launch = ConfirmationLaunch {
            request_id: request_id.clone(),
            url: launch_url(&self.base_url, &pending, stored),
            stored,
            width: SURFACE_WIDTH,
            height: SURFACE_HEIGHT,
            api_token: self.api_token.clone(),
        };

        if let Err(e) = self.surface.open(launch.clone()) {
            if stored {
                if let Err(store_err) = self.store.take(&key) {
                    warn!(
                        request_id = %request_id,
                        error = %store_err,
                        "Failed to roll back pending confirmation"
                    );
                }
            }
            self.finish(&flight);
            return Err(e.into());
        }

        info!(
            request_id = %request_id,
            tab_id,
            origin,
            method = %pending.payload.method,
            stored,
            "Confirmation opened"
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::ConfirmationOpened)
                .with_origin(origin)
                .with_tab(tab_id)
                .with_request(&request_id)
                .with_details(serde_json::json!({ "method": pending.payload.method })),
        );
        Ok(launch)
    }

    /// Look up a pending confirmation without consuming it.
    pub fn get(&self, request_id: &str) -> Result<Option<PendingConfirmation>, CorrelatorError> {
        Ok(self.store.get(&session_key(request_id))?)
    }

    /// Remove a pending confirmation. Returns `None` once already taken.
    pub fn take(&self, request_id: &str) -> Result<Option<PendingConfirmation>, CorrelatorError> {
        Ok(self.store.take(&session_key(request_id))?)
    }

    /// Send the response for `pending` to its source tab, at most once per
    /// `(tab, rpc id)`. Returns `false` if it was already answered.
    pub fn deliver(
        &self,
        pending: &PendingConfirmation,
        response: &RpcResponse,
    ) -> Result<bool, CorrelatorError> {
        let flight = (pending.tab_id, pending.payload.id.clone());
        let first = {
            let mut in_flight = self.in_flight.lock().map_err(|_| CorrelatorError::Poisoned)?;
            in_flight.remove(&flight).is_some()
        };
        if !first {
            return Ok(false);
        }
        self.runtime.send_to_tab(pending.tab_id, response.to_value())?;
        Ok(true)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Whether `pending` is still waiting for its decision.
    pub fn is_awaiting(&self, pending: &PendingConfirmation) -> bool {
        self.in_flight
            .lock()
            .map(|f| f.contains_key(&(pending.tab_id, pending.payload.id.clone())))
            .unwrap_or(false)
    }

    /// Drop requests left undecided past the expiry, with their session
    /// records. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut expired = Vec::new();
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.retain(|(tab_id, _), flight| {
                let live = now.duration_since(flight.opened) < self.expiry;
                if !live {
                    expired.push((*tab_id, flight.request_id.clone()));
                }
                live
            }),
            Err(_) => return 0,
        }

        for (tab_id, request_id) in &expired {
            if let Err(e) = self.store.take(&session_key(request_id)) {
                warn!(request_id = %request_id, error = %e, "Failed to drop expired confirmation");
            }
            info!(request_id = %request_id, tab_id, "Undecided confirmation expired");
            self.audit.record(
                AuditEvent::new(AuditEventType::ConfirmationExpired)
                    .with_tab(*tab_id)
                    .with_request(request_id.as_str()),
            );
        }
        expired.len()
    }

    /// Sweep expired requests every `interval` until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            expiry_secs = self.expiry.as_secs(),
            "Confirmation sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let removed = self.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = self.in_flight(), "Swept expired confirmations");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Confirmation sweeper shutting down");
                    return;
                }
            }
        }
    }

    fn finish(&self, flight: &FlightKey) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(flight);
        }
    }
}
