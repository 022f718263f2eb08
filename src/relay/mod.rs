// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Bus
//!
//! Moves envelopes between the page and the background context. No business
//! logic lives here: only sender, origin, rate and shape checks, and hand-off.
//!
//! ```text
//! ProviderFacade ──document event──▶ ContentRelay ──runtime──▶ BackgroundRelay ──▶ Correlator
//!       ▲                                 │                           │
//!       └──────window message─────────────┘◀──────runtime─────────────┘ (policy errors)
//! ```

pub mod background;
pub mod content;
pub mod messages;
pub mod runtime;

pub use background::{BackgroundRelay, Disposition};
pub use content::{ContentRelay, DropReason, EventThrottle};
pub use messages::{EventSource, MessageSender, PageEvent, RuntimeMessage, TabId, REQUEST_EVENT};
pub use runtime::{ExtensionRuntime, TabPort};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("tab {0} is not connected")]
    TabNotConnected(TabId),
    #[error("message channel closed or full")]
    ChannelClosed,
    #[error("runtime state poisoned")]
    Poisoned,
}
