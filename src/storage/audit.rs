// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Vault transitions, policy rejections, and confirmation decisions are
//! appended to a daily JSONL file. Recording never fails the audited
//! operation: write errors are logged and swallowed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use super::{StoragePaths, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Vault events
    WalletCreated,
    WalletDeleted,
    UnlockSucceeded,
    UnlockFailed,
    LockoutReached,
    Locked,
    AutoLocked,

    // Relay policy events
    OriginRejected,
    RateLimited,

    // Confirmation events
    ConfirmationOpened,
    ConfirmationApproved,
    ConfirmationRejected,
    ConfirmationExpired,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Requesting page origin (if any).
    pub origin: Option<String>,
    /// Source tab (if any).
    pub tab_id: Option<u32>,
    /// Confirmation request ID (if any).
    pub request_id: Option<String>,
    /// Additional details as JSON. Never carries secret material.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            origin: None,
            tab_id: None,
            request_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_tab(mut self, tab_id: u32) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Append-only audit trail.
#[derive(Debug)]
pub struct AuditLog {
    paths: Option<StoragePaths>,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Audit log rooted at the given storage layout.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths: Some(paths),
            write_lock: Mutex::new(()),
        }
    }

    /// An audit log that discards every event.
    pub fn disabled() -> Self {
        Self {
            paths: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.paths.is_some()
    }

    /// Record an event, logging (not returning) any failure.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            warn!(
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Append an event to the daily log file.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };

        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = paths.audit_events_file(&date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(event).map_err(|e| {
            StorageError::SerializationError(format!("Failed to serialize audit event: {e}"))
        })?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read audit events for a specific date. A day with no file is empty.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let Some(paths) = &self.paths else {
            return Ok(Vec::new());
        };

        let content = match fs::read_to_string(paths.audit_events_file(date)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    StorageError::SerializationError(format!(
                        "Failed to deserialize audit event: {e}"
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::ConfirmationOpened)
            .with_origin("http://localhost:3000")
            .with_tab(7)
            .with_request("req-1");

        assert_eq!(event.event_type, AuditEventType::ConfirmationOpened);
        assert_eq!(event.origin.as_deref(), Some("http://localhost:3000"));
        assert_eq!(event.tab_id, Some(7));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::UnlockFailed).failed("wrong pin");
        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("wrong pin"));
    }

    #[test]
    fn log_and_read_events() {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::new(StoragePaths::new(temp.path()));

        log.record(AuditEvent::new(AuditEventType::WalletCreated));
        log.record(AuditEvent::new(AuditEventType::OriginRejected).with_origin("https://evil.com"));

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = log.read_events(&today).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::WalletCreated);
        assert_eq!(events[1].event_type, AuditEventType::OriginRejected);
        assert!(log.read_events("1999-01-01").unwrap().is_empty());
    }

    #[test]
    fn disabled_log_discards_events() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        log.record(AuditEvent::new(AuditEventType::Locked));
        assert!(log.read_events("2026-01-01").unwrap().is_empty());
    }

    #[test]
    fn event_types_are_snake_case() {
        let json = serde_json::to_string(&AuditEventType::AutoLocked).unwrap();
        assert_eq!(json, "\"auto_locked\"");
    }
}
