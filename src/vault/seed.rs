// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Plaintext seed material. Zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretSeed(String);

impl SecretSeed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    /// Borrow the plaintext. Callers must not copy it into long-lived state.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSeed([REDACTED])")
    }
}

impl From<String> for SecretSeed {
    fn from(seed: String) -> Self {
        Self(seed)
    }
}
