// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet Relay - browser wallet request relay and session vault
//!
//! Models a wallet extension's trust boundary: an untrusted page calls a
//! provider façade, requests cross a relay bus guarded by an origin
//! allow-list and a per-origin rate limiter, and every request waits for an
//! explicit user decision made against a PIN-encrypted session vault.
//!
//! ## Modules
//!
//! - `provider` - Page-facing façade and provider discovery
//! - `page` - Page context: document events and window messages
//! - `relay` - Content relay, extension runtime, background relay
//! - `policy` - Origin Gatekeeper and Rate Limiter
//! - `confirm` - Confirmation Correlator and resolution
//! - `vault` - PIN-encrypted Session Vault with auto-lock
//! - `storage` - Local key-value storage and audit log
//! - `api` - Confirmation surface HTTP API (Axum)
//! - `auth` - Bearer token guarding the API
//! - `extension` - Wiring of all contexts

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod error;
pub mod extension;
pub mod handler;
pub mod logging;
pub mod page;
pub mod policy;
pub mod provider;
pub mod relay;
pub mod rpc;
pub mod state;
pub mod storage;
pub mod vault;
