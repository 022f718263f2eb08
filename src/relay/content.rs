// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content relay: the in-page half of the relay bus.
//!
//! Page → background: accepts only `stackswallet_request` events raised on
//! the document itself, carrying a valid request envelope, and forwards the
//! payload unchanged. Everything else is dropped and logged; the page is
//! never told why.
//!
//! Background → page: accepts only messages whose runtime-verified sender is
//! this extension, and posts JSON-RPC payloads into the page window with the
//! page's own origin as target.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{EventSource, PageEvent, RuntimeMessage, REQUEST_EVENT};
use super::runtime::TabPort;
use crate::clock::SharedClock;
use crate::logging::sanitize_for_log;
use crate::page::PageContext;
use crate::rpc::{validate_envelope, JSONRPC_VERSION};

/// Minimum spacing of accepted page events (at most 10 per second).
pub const DEFAULT_MIN_EVENT_INTERVAL: Duration = Duration::from_millis(100);

/// Drops events arriving sooner than `min_interval` after the last accepted
/// one. A zero interval accepts everything.
#[derive(Debug, Clone)]
pub struct EventThrottle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl EventThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        if self.min_interval.is_zero() {
            return true;
        }
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// Why a page event was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    OtherEvent,
    Throttled,
    FromFrame,
    NotAnObject,
    InvalidEnvelope,
    RuntimeUnavailable,
}

pub struct ContentRelay {
    page: PageContext,
    port: TabPort,
    throttle: EventThrottle,
    clock: SharedClock,
}

impl ContentRelay {
    pub fn new(page: PageContext, port: TabPort, min_interval: Duration, clock: SharedClock) -> Self {
        Self {
            page,
            port,
            throttle: EventThrottle::new(min_interval),
            clock,
        }
    }

    /// Relay in both directions until shutdown or until the page goes away.
    pub async fn run(mut self, mut events: mpsc::Receiver<PageEvent>, shutdown: CancellationToken) {
        let tab_id = self.port.tab_id();
        info!(tab_id, origin = %self.page.origin(), "Content relay starting");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let _ = self.on_page_event(event);
                    }
                    None => break,
                },
                message = self.port.recv() => match message {
                    Some(message) => {
                        self.on_runtime_message(message);
                    }
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    info!(tab_id, "Content relay shutting down");
                    return;
                }
            }
        }
        debug!(tab_id, "Content relay stopped");
    }

    /// Validate one page event and forward it.
    pub fn on_page_event(&mut self, event: PageEvent) -> Result<(), DropReason> {
        if event.name != REQUEST_EVENT {
            return Err(DropReason::OtherEvent);
        }

        if !self.throttle.allow(self.clock.now()) {
            warn!("Page event rate limit exceeded");
            return Err(DropReason::Throttled);
        }

        if event.source != EventSource::Document {
            warn!("Ignoring event from non-document source");
            return Err(DropReason::FromFrame);
        }

        if !event.detail.is_object() {
            warn!("Invalid event detail");
            return Err(DropReason::NotAnObject);
        }

        if let Err(e) = validate_envelope(&event.detail) {
            warn!(
                reason = %e,
                detail = %sanitize_for_log(&event.detail),
                "Invalid JSON-RPC request"
            );
            return Err(DropReason::InvalidEnvelope);
        }

        self.port.send_to_background(event.detail).map_err(|e| {
            warn!(error = %e, "Failed to forward request to background");
            DropReason::RuntimeUnavailable
        })
    }

    /// Post an extension response into the page. Returns whether it was posted.
    pub fn on_runtime_message(&self, message: RuntimeMessage) -> bool {
        if message.sender.extension_id != self.port.extension_id() {
            warn!(
                sender = %message.sender.extension_id,
                "Ignoring message from unknown sender"
            );
            return false;
        }

        if message.payload.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            debug!("Ignoring non JSON-RPC runtime message");
            return false;
        }

        let origin = self.page.origin();
        self.page.post_message(origin, message.payload, origin)
    }
}
