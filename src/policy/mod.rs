// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay policy: which origins may talk to the wallet, and how often.

pub mod origin;
pub mod rate_limit;

pub use origin::{OriginMatch, OriginPolicy, OriginRejection, DEFAULT_ALLOWED_ORIGINS};
pub use rate_limit::{RateBucket, RateLimitConfig, RateLimiter};
