// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Correlator
//!
//! Every request that passes the background gatekeeper ends up here. The
//! correlator stores it under a fresh `requestId`, opens the confirmation
//! surface, and later turns the user's decision into exactly one response
//! sent back to the source tab.
//!
//! | Decision | Response |
//! |----------|----------|
//! | Approve (unlocked) | handler `result`, or a normalized handler error |
//! | Approve (locked) | none yet, the request stays pending |
//! | Reject | `4001` User rejected the request |

mod correlator;
mod resolve;
pub mod store;
pub mod surface;

pub use correlator::ConfirmationCorrelator;
pub use resolve::{normalize_handler_error, Resolution, ResolveError};
pub use store::{session_key, MemorySessionStore, PendingConfirmation, SessionStore, SessionStoreError};
pub use surface::{
    launch_url, surface_origin, ChannelSurface, ConfirmationLaunch, ConfirmationSurface,
    SurfaceError, SURFACE_HEIGHT, SURFACE_WIDTH,
};

use crate::relay::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum CorrelatorError {
    #[error("request {0} is already awaiting confirmation")]
    DuplicateRequest(String),
    #[error("launch URL is missing {0}")]
    InvalidLaunch(&'static str),
    #[error(transparent)]
    Store(#[from] SessionStoreError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("correlator state poisoned")]
    Poisoned,
}
