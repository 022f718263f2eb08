// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # JSON-RPC 2.0 Wire Protocol
//!
//! Envelopes exchanged between the page and the wallet. The relay treats
//! `params` and `result` as opaque values; only the envelope shape is
//! validated.
//!
//! ## Error Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `-32601` | Method not supported |
//! | `-32600` | Origin not allowed / invalid request |
//! | `-32602` | Invalid params |
//! | `-32603` | Internal error |
//! | `-32000` | Rate limit exceeded / request timeout |
//! | `-31000` | Unknown error raised by a method handler |
//! | `4001` | User rejected the request |

pub mod envelope;
pub mod methods;

pub use envelope::{
    codes, validate_envelope, EnvelopeError, RpcError, RpcOutcome, RpcRequest, RpcResponse,
    JSONRPC_VERSION,
};
pub use methods::{is_supported, SUPPORTED_METHODS};
