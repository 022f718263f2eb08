// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Origin gatekeeper.
//!
//! The origin always comes from the runtime-verified message sender, never
//! from message content.

use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Default origin allow-list (local development only).
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] =
    ["http://localhost", "http://127.0.0.1", "https://localhost"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginRejection {
    #[error("origin is missing")]
    Missing,
    #[error("origin '{origin}' is not in the allowlist")]
    NotAllowed { origin: String },
}

/// How configured entries are compared with a sender origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OriginMatch {
    /// `origin.starts_with(entry)`. Note that `http://localhost` also
    /// admits `http://localhost.evil.com`.
    #[default]
    Prefix,
    /// Scheme, host and port must be equal.
    Exact,
}

impl FromStr for OriginMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(Self::Prefix),
            "exact" => Ok(Self::Exact),
            other => Err(format!("unknown origin match mode '{other}'")),
        }
    }
}

/// Ordered allow-list of origins.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    mode: OriginMatch,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ORIGINS)
    }
}

impl OriginPolicy {
    /// Prefix-matching policy.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            mode: OriginMatch::Prefix,
        }
    }

    pub fn with_mode(mut self, mode: OriginMatch) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> OriginMatch {
        self.mode
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Check a sender origin against the allow-list.
    pub fn check(&self, origin: Option<&str>) -> Result<(), OriginRejection> {
        let origin = match origin {
            None => return Err(OriginRejection::Missing),
            Some(o) if o.trim().is_empty() => return Err(OriginRejection::Missing),
            Some(o) => o,
        };

        let allowed = match self.mode {
            OriginMatch::Prefix => self.allowed.iter().any(|entry| origin.starts_with(entry)),
            OriginMatch::Exact => match serialized_origin(origin) {
                Some(origin) => self
                    .allowed
                    .iter()
                    .filter_map(|entry| serialized_origin(entry))
                    .any(|entry| entry == origin),
                None => false,
            },
        };

        if allowed {
            Ok(())
        } else {
            Err(OriginRejection::NotAllowed {
                origin: origin.to_string(),
            })
        }
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        self.check(origin).is_ok()
    }
}

/// `scheme://host[:port]` of a URL or origin string; `None` for opaque origins.
pub fn serialized_origin(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
