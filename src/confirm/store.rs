// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session-lifetime storage for pending confirmations.
//!
//! Entries survive page navigation but not a browser restart, so the store
//! is in-memory only. Keys are `request_{requestId}`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::relay::TabId;
use crate::rpc::RpcRequest;

/// A request waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub request_id: String,
    #[schema(value_type = Object)]
    pub payload: RpcRequest,
    pub tab_id: TabId,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session storage is not available")]
    Unavailable,
}

pub fn session_key(request_id: &str) -> String {
    format!("request_{request_id}")
}

pub trait SessionStore: Send + Sync {
    fn put(&self, key: &str, pending: PendingConfirmation) -> Result<(), SessionStoreError>;
    fn get(&self, key: &str) -> Result<Option<PendingConfirmation>, SessionStoreError>;
    /// Remove and return an entry; a second take of the same key is `None`.
    fn take(&self, key: &str) -> Result<Option<PendingConfirmation>, SessionStoreError>;
}

#[derive(Debug)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, PendingConfirmation>>,
    available: AtomicBool,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate session storage being unavailable (or available again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, PendingConfirmation>>, SessionStoreError>
    {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SessionStoreError::Unavailable);
        }
        self.entries.lock().map_err(|_| SessionStoreError::Unavailable)
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, key: &str, pending: PendingConfirmation) -> Result<(), SessionStoreError> {
        self.entries()?.insert(key.to_string(), pending);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<PendingConfirmation>, SessionStoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn take(&self, key: &str) -> Result<Option<PendingConfirmation>, SessionStoreError> {
        Ok(self.entries()?.remove(key))
    }
}
