// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Values exchanged between execution contexts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Browser tab identifier assigned by the runtime.
pub type TabId = u32;

/// Document event name the provider façade dispatches requests under.
pub const REQUEST_EVENT: &str = "stackswallet_request";

/// Where a document-level event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The page's own document.
    Document,
    /// An embedded frame.
    Frame,
}

/// A page-local custom event.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEvent {
    pub name: String,
    pub source: EventSource,
    pub detail: Value,
}

/// Sender identity attached by the runtime, never by the message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    /// Extension that owns the sending context.
    pub extension_id: String,
    /// Tab of the sending content script, absent for extension pages.
    pub tab_id: Option<TabId>,
    pub origin: Option<String>,
    pub url: Option<String>,
}

impl MessageSender {
    /// `origin`, falling back to `url`.
    pub fn origin_or_url(&self) -> Option<&str> {
        self.origin
            .as_deref()
            .or(self.url.as_deref())
            .filter(|o| !o.is_empty())
    }
}

/// A runtime message with its verified sender.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeMessage {
    pub sender: MessageSender,
    pub payload: Value,
}
