// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Extension runtime: the message router between content scripts and the
//! background context.
//!
//! The runtime is the only component that writes [`MessageSender`]. A
//! content script cannot claim another tab or origin: its port is bound to
//! the tab it was connected for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{MessageSender, RuntimeMessage, TabId};
use super::RelayError;

/// Capacity of each runtime inbox.
pub const RUNTIME_CHANNEL_CAPACITY: usize = 256;

struct TabEntry {
    origin: String,
    url: String,
    tx: mpsc::Sender<RuntimeMessage>,
}

pub struct ExtensionRuntime {
    extension_id: String,
    background: mpsc::Sender<RuntimeMessage>,
    tabs: Mutex<HashMap<TabId, TabEntry>>,
    next_tab_id: AtomicU32,
}

impl ExtensionRuntime {
    /// Create the runtime and the background context's inbox.
    pub fn new(extension_id: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<RuntimeMessage>) {
        let (background, inbox) = mpsc::channel(RUNTIME_CHANNEL_CAPACITY);
        let runtime = Arc::new(Self {
            extension_id: extension_id.into(),
            background,
            tabs: Mutex::new(HashMap::new()),
            next_tab_id: AtomicU32::new(1),
        });
        (runtime, inbox)
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Attach a content script for a tab showing `url` at `origin`.
    pub fn connect_tab(self: &Arc<Self>, origin: &str, url: &str) -> Result<TabPort, RelayError> {
        let tab_id = self.next_tab_id.fetch_add(1, Ordering::Relaxed);
        let (tx, inbox) = mpsc::channel(RUNTIME_CHANNEL_CAPACITY);

        let mut tabs = self.tabs.lock().map_err(|_| RelayError::Poisoned)?;
        tabs.insert(
            tab_id,
            TabEntry {
                origin: origin.to_string(),
                url: url.to_string(),
                tx,
            },
        );
        debug!(tab_id, origin, "Tab connected");

        Ok(TabPort {
            tab_id,
            runtime: Arc::clone(self),
            inbox,
        })
    }

    pub fn disconnect_tab(&self, tab_id: TabId) {
        if let Ok(mut tabs) = self.tabs.lock() {
            if tabs.remove(&tab_id).is_some() {
                debug!(tab_id, "Tab disconnected");
            }
        }
    }

    pub fn is_connected(&self, tab_id: TabId) -> bool {
        self.tabs
            .lock()
            .map(|tabs| tabs.contains_key(&tab_id))
            .unwrap_or(false)
    }

    fn own_sender(&self) -> MessageSender {
        MessageSender {
            extension_id: self.extension_id.clone(),
            tab_id: None,
            origin: None,
            url: None,
        }
    }

    /// Send a message from the extension to a tab's content script.
    pub fn send_to_tab(&self, tab_id: TabId, payload: Value) -> Result<(), RelayError> {
        self.deliver_to_tab(
            tab_id,
            RuntimeMessage {
                sender: self.own_sender(),
                payload,
            },
        )
    }

    /// Deliver a message from another extension to a tab. Content scripts
    /// must ignore these.
    pub fn send_external(
        &self,
        tab_id: TabId,
        extension_id: &str,
        payload: Value,
    ) -> Result<(), RelayError> {
        self.deliver_to_tab(
            tab_id,
            RuntimeMessage {
                sender: MessageSender {
                    extension_id: extension_id.to_string(),
                    tab_id: None,
                    origin: None,
                    url: None,
                },
                payload,
            },
        )
    }

    fn deliver_to_tab(&self, tab_id: TabId, message: RuntimeMessage) -> Result<(), RelayError> {
        let tx = {
            let tabs = self.tabs.lock().map_err(|_| RelayError::Poisoned)?;
            tabs.get(&tab_id)
                .map(|entry| entry.tx.clone())
                .ok_or(RelayError::TabNotConnected(tab_id))?
        };
        tx.try_send(message).map_err(|_| RelayError::ChannelClosed)
    }

    fn send_from_tab(&self, tab_id: TabId, payload: Value) -> Result<(), RelayError> {
        let sender = {
            let tabs = self.tabs.lock().map_err(|_| RelayError::Poisoned)?;
            let entry = tabs.get(&tab_id).ok_or(RelayError::TabNotConnected(tab_id))?;
            MessageSender {
                extension_id: self.extension_id.clone(),
                tab_id: Some(tab_id),
                origin: Some(entry.origin.clone()),
                url: Some(entry.url.clone()),
            }
        };
        self.background
            .try_send(RuntimeMessage { sender, payload })
            .map_err(|_| RelayError::ChannelClosed)
    }
}

/// A content script's connection to the runtime.
pub struct TabPort {
    tab_id: TabId,
    runtime: Arc<ExtensionRuntime>,
    inbox: mpsc::Receiver<RuntimeMessage>,
}

impl TabPort {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn extension_id(&self) -> &str {
        self.runtime.extension_id()
    }

    /// Forward a payload to the background context.
    pub fn send_to_background(&self, payload: Value) -> Result<(), RelayError> {
        self.runtime.send_from_tab(self.tab_id, payload)
    }

    pub async fn recv(&mut self) -> Option<RuntimeMessage> {
        self.inbox.recv().await
    }
}

impl Drop for TabPort {
    fn drop(&mut self) {
        self.runtime.disconnect_tab(self.tab_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn runtime_stamps_tab_identity() {
        let (runtime, mut background) = ExtensionRuntime::new("ext-1");
        let port = runtime
            .connect_tab("http://localhost:3000", "http://localhost:3000/app")
            .unwrap();

        port.send_to_background(json!({ "hello": 1 })).unwrap();
        let message = background.recv().await.unwrap();
        assert_eq!(message.sender.extension_id, "ext-1");
        assert_eq!(message.sender.tab_id, Some(port.tab_id()));
        assert_eq!(message.sender.origin.as_deref(), Some("http://localhost:3000"));
        assert_eq!(message.payload, json!({ "hello": 1 }));
    }

    #[tokio::test]
    async fn tab_messages_are_routed_by_id() {
        let (runtime, _background) = ExtensionRuntime::new("ext-1");
        let mut a = runtime.connect_tab("http://localhost:1", "http://localhost:1/").unwrap();
        let mut b = runtime.connect_tab("http://localhost:2", "http://localhost:2/").unwrap();
        assert_ne!(a.tab_id(), b.tab_id());

        runtime.send_to_tab(b.tab_id(), json!("for b")).unwrap();
        runtime.send_external(a.tab_id(), "other-ext", json!("spoof")).unwrap();

        let to_b = b.recv().await.unwrap();
        assert_eq!(to_b.payload, json!("for b"));
        assert_eq!(to_b.sender.extension_id, "ext-1");

        let to_a = a.recv().await.unwrap();
        assert_eq!(to_a.sender.extension_id, "other-ext");
    }

    #[test]
    fn dropping_port_disconnects_tab() {
        let (runtime, _background) = ExtensionRuntime::new("ext-1");
        let port = runtime.connect_tab("http://localhost", "http://localhost/").unwrap();
        let tab_id = port.tab_id();
        assert!(runtime.is_connected(tab_id));
        drop(port);
        assert!(!runtime.is_connected(tab_id));
        assert!(matches!(
            runtime.send_to_tab(tab_id, json!(null)),
            Err(RelayError::TabNotConnected(_))
        ));
    }
}
