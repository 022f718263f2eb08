// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Page context: one untrusted web page.
//!
//! A page has two communication surfaces:
//!
//! | Surface | Direction | Observed by |
//! |---------|-----------|-------------|
//! | document events | page → content relay | the in-page relay only |
//! | window messages | anyone → page | every listener on the page |
//!
//! Window messages carry the origin of the context that posted them and are
//! only delivered when the target origin is `*` or the page's own origin.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::relay::{EventSource, PageEvent};

/// Document events not yet consumed by the content relay.
pub const PAGE_EVENT_CAPACITY: usize = 64;

/// Window messages buffered per listener. A listener that falls further
/// behind loses the oldest messages, so a page flooding its own window can
/// push out a response; the waiting call then ends at its timeout.
pub const WINDOW_MESSAGE_CAPACITY: usize = 1024;

/// A message as seen by a window `message` listener.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Origin of the posting context.
    pub origin: String,
    pub data: Value,
}

struct PageInner {
    origin: String,
    url: String,
    events: mpsc::Sender<PageEvent>,
    window: broadcast::Sender<WindowMessage>,
}

/// Cheap-to-clone handle to a page.
#[derive(Clone)]
pub struct PageContext {
    inner: Arc<PageInner>,
}

impl PageContext {
    /// Create a page and the receiving end of its document event stream.
    pub fn new(origin: &str, url: &str) -> (Self, mpsc::Receiver<PageEvent>) {
        let (events, rx) = mpsc::channel(PAGE_EVENT_CAPACITY);
        let (window, _) = broadcast::channel(WINDOW_MESSAGE_CAPACITY);
        let page = Self {
            inner: Arc::new(PageInner {
                origin: origin.to_string(),
                url: url.to_string(),
                events,
                window,
            }),
        };
        (page, rx)
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Dispatch a custom event on the document. Returns `false` when the
    /// event could not be queued; it is then lost, like an event with no
    /// listener.
    pub fn dispatch_event(&self, name: &str, detail: Value) -> bool {
        self.dispatch(name, EventSource::Document, detail)
    }

    /// Dispatch an event that bubbled up from an embedded frame.
    pub fn dispatch_frame_event(&self, name: &str, detail: Value) -> bool {
        self.dispatch(name, EventSource::Frame, detail)
    }

    fn dispatch(&self, name: &str, source: EventSource, detail: Value) -> bool {
        let event = PageEvent {
            name: name.to_string(),
            source,
            detail,
        };
        match self.inner.events.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Page event dropped");
                false
            }
        }
    }

    /// `window.postMessage(data, target_origin)` from a context at
    /// `sender_origin`. Returns whether the message was delivered.
    pub fn post_message(&self, sender_origin: &str, data: Value, target_origin: &str) -> bool {
        if target_origin != "*" && target_origin != self.inner.origin {
            debug!(target_origin, "Window message not delivered: target mismatch");
            return false;
        }
        // No listeners is still a delivery.
        let _ = self.inner.window.send(WindowMessage {
            origin: sender_origin.to_string(),
            data,
        });
        true
    }

    /// Add a window `message` listener.
    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.inner.window.subscribe()
    }
}
