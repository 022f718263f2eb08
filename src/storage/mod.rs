// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Extension-local persistent storage and the security audit trail.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   storage/
//!     wallet_encrypted.json   # EncryptedVaultBlob (base64 fields)
//!     mnemonic.json           # legacy plaintext fallback, scrubbed on delete
//!   audit/
//!     {date}/events.jsonl     # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - The plaintext seed is never written here; only the AES-GCM blob is
//! - Absence of a key is a normal state ("no wallet provisioned")
//! - Deletion of secret-bearing keys goes through [`KeyValueStore::scrub`]

pub mod audit;
pub mod local;
pub mod paths;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use local::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageResult};
pub use paths::StoragePaths;
