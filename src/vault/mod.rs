// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Vault
//!
//! Owns the encrypted seed blob and the lock/unlock state machine.
//!
//! ## Invariants
//!
//! - The plaintext seed never reaches storage; only [`EncryptedVaultBlob`] does
//! - `Unlocked` holds a decrypted seed and an armed auto-lock timer
//! - `Locked` holds neither; the dropped seed is zeroized
//! - `failed_attempts` stays within `0..=max_attempts`

pub mod crypto;
mod seed;
pub mod session;

pub use crypto::{CryptoError, EncryptedVaultBlob};
pub use seed::SecretSeed;
pub use session::{
    ActivitySignal, LockState, LockoutPolicy, NoLockoutDelay, SessionVault, VaultConfig,
    VaultError, VaultStatus, LEGACY_MNEMONIC_KEY, WALLET_KEY,
};
