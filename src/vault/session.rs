// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session vault state machine.
//!
//! | From | Event | To | Effect |
//! |------|-------|----|--------|
//! | any | `unlock(pin)` ok | Unlocked | failures reset, seed held, timer armed |
//! | any | `unlock(pin)` wrong PIN | unchanged | `failed_attempts += 1` (saturating at max) |
//! | any | `lock()` | Locked | seed dropped (zeroized), timer cancelled |
//! | Unlocked | activity | Unlocked | idle deadline moves to `now + idle_timeout` |
//! | Unlocked | idle deadline passes | Locked | as `lock()` |
//! | any | `delete_wallet()` | Locked | blob scrubbed, no wallet, failures reset |
//!
//! All state sits behind one async mutex. Unlock holds it across key
//! derivation, so concurrent unlocks serialize and every failed attempt is
//! counted exactly once.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use zeroize::{Zeroize, Zeroizing};

use super::crypto::{self, CryptoError, EncryptedVaultBlob};
use super::SecretSeed;
use crate::clock::SharedClock;
use crate::storage::{AuditEvent, AuditEventType, AuditLog, KeyValueStore, StorageError};

/// Storage key of the serialized [`EncryptedVaultBlob`].
pub const WALLET_KEY: &str = "wallet_encrypted";

/// Legacy plaintext fallback, only ever scrubbed.
pub const LEGACY_MNEMONIC_KEY: &str = "mnemonic";

/// Minimum filler written over the blob before removal.
pub const SCRUB_FILLER_LEN: usize = 1000;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("PIN must be exactly 6 digits")]
    InvalidPin,
    #[error("no wallet provisioned")]
    NoWallet,
    #[error("wrong PIN ({attempts_remaining} attempts remaining)")]
    WrongPin { attempts_remaining: u32 },
    #[error("too many failed attempts, retry in {retry_after:?}")]
    LockedOut { retry_after: Duration },
    #[error("stored vault is corrupt")]
    Corrupt,
    #[error("crypto failure: {0}")]
    Crypto(CryptoError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("vault task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// User-activity signals that keep an unlocked session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    PointerMove,
    Click,
    KeyPress,
    Scroll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VaultStatus {
    pub state: LockState,
    pub has_wallet: bool,
    pub failed_attempts: u32,
    pub attempts_remaining: u32,
    pub max_attempts: u32,
    pub locked_out: bool,
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub idle_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Hook for delaying unlock attempts once the failure limit is reached.
pub trait LockoutPolicy: Send + Sync {
    /// Delay to enforce after the most recent failure, or `None` to allow
    /// the attempt.
    fn delay(&self, failed_attempts: u32, max_attempts: u32) -> Option<Duration>;
}

/// Never blocks: reaching the limit is reported, not enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockoutDelay;

impl LockoutPolicy for NoLockoutDelay {
    fn delay(&self, _failed_attempts: u32, _max_attempts: u32) -> Option<Duration> {
        None
    }
}

struct SessionInner {
    seed: Option<SecretSeed>,
    has_wallet: bool,
    failed_attempts: u32,
    last_failure: Option<Instant>,
    last_activity: Instant,
    timer: Option<CancellationToken>,
}

impl SessionInner {
    fn state(&self) -> LockState {
        if self.seed.is_some() {
            LockState::Unlocked
        } else {
            LockState::Locked
        }
    }
}

pub struct SessionVault {
    me: Weak<SessionVault>,
    inner: Mutex<SessionInner>,
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    config: VaultConfig,
    lockout: Arc<dyn LockoutPolicy>,
    audit: Arc<AuditLog>,
    shutdown: CancellationToken,
}

impl SessionVault {
    /// Build a locked vault that never delays unlock attempts. Wallet
    /// presence is read from `store` once here and tracked afterwards.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        config: VaultConfig,
        audit: Arc<AuditLog>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, VaultError> {
        Self::with_lockout_policy(store, clock, config, Arc::new(NoLockoutDelay), audit, shutdown)
    }

    pub fn with_lockout_policy(
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        config: VaultConfig,
        lockout: Arc<dyn LockoutPolicy>,
        audit: Arc<AuditLog>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, VaultError> {
        let has_wallet = store.get(WALLET_KEY)?.is_some();
        let now = clock.now();
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            inner: Mutex::new(SessionInner {
                seed: None,
                has_wallet,
                failed_attempts: 0,
                last_failure: None,
                last_activity: now,
                timer: None,
            }),
            store,
            clock,
            config,
            lockout,
            audit,
            shutdown,
        }))
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ========== Provisioning ==========

    /// Encrypt `seed` under `pin` and persist it, replacing any previous
    /// wallet. The vault stays locked.
    pub async fn create_wallet(&self, seed: SecretSeed, pin: &str) -> Result<(), VaultError> {
        if !crypto::is_valid_pin(pin) {
            return Err(VaultError::InvalidPin);
        }

        let mut inner = self.inner.lock().await;
        let pin = Zeroizing::new(pin.to_string());
        let blob = tokio::task::spawn_blocking(move || crypto::encrypt_with_pin(seed.as_bytes(), &pin))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))?
            .map_err(VaultError::Crypto)?;

        let serialized = serde_json::to_string(&blob).map_err(|_| VaultError::Corrupt)?;
        self.store.set(WALLET_KEY, &serialized)?;

        self.lock_inner(&mut inner, None);
        inner.has_wallet = true;
        inner.failed_attempts = 0;
        inner.last_failure = None;

        info!("Wallet created");
        self.audit.record(AuditEvent::new(AuditEventType::WalletCreated));
        Ok(())
    }

    /// Scrub the blob and the legacy key, then reset to locked, no wallet.
    pub async fn delete_wallet(&self) -> Result<(), VaultError> {
        let mut inner = self.inner.lock().await;

        self.store.scrub(WALLET_KEY, SCRUB_FILLER_LEN)?;
        if self.store.scrub(LEGACY_MNEMONIC_KEY, 0)? {
            info!("Scrubbed legacy plaintext mnemonic");
        }

        self.lock_inner(&mut inner, None);
        inner.has_wallet = false;
        inner.failed_attempts = 0;
        inner.last_failure = None;

        info!("Wallet deleted");
        self.audit.record(AuditEvent::new(AuditEventType::WalletDeleted));
        Ok(())
    }

    // ========== Lock / Unlock ==========

    /// Decrypt the stored seed with `pin`.
    ///
    /// Only an authentication failure counts as a failed attempt; a
    /// malformed PIN or a missing wallet does not.
    pub async fn unlock(&self, pin: &str) -> Result<SecretSeed, VaultError> {
        if !crypto::is_valid_pin(pin) {
            return Err(VaultError::InvalidPin);
        }

        let mut inner = self.inner.lock().await;

        if inner.failed_attempts >= self.config.max_attempts {
            if let Some(delay) = self
                .lockout
                .delay(inner.failed_attempts, self.config.max_attempts)
            {
                let since = inner
                    .last_failure
                    .map(|at| self.clock.now().duration_since(at))
                    .unwrap_or(delay);
                if since < delay {
                    return Err(VaultError::LockedOut {
                        retry_after: delay - since,
                    });
                }
            }
        }

        let Some(raw) = self.store.get(WALLET_KEY)? else {
            inner.has_wallet = false;
            return Err(VaultError::NoWallet);
        };
        inner.has_wallet = true;
        let blob: EncryptedVaultBlob = serde_json::from_str(&raw).map_err(|_| VaultError::Corrupt)?;

        let pin = Zeroizing::new(pin.to_string());
        let decrypted = tokio::task::spawn_blocking(move || crypto::decrypt_with_pin(&blob, &pin))
            .await
            .map_err(|e| VaultError::Task(e.to_string()))?;

        match decrypted {
            Ok(mut plaintext) => {
                let seed = match String::from_utf8(std::mem::take(&mut *plaintext)) {
                    Ok(seed) => SecretSeed::new(seed),
                    Err(e) => {
                        e.into_bytes().zeroize();
                        return Err(VaultError::Corrupt);
                    }
                };

                inner.seed = Some(seed.clone());
                inner.failed_attempts = 0;
                inner.last_failure = None;
                inner.last_activity = self.clock.now();
                self.arm_timer(&mut inner);

                info!("Vault unlocked");
                self.audit.record(AuditEvent::new(AuditEventType::UnlockSucceeded));
                Ok(seed)
            }
            Err(CryptoError::Decrypt) => {
                inner.failed_attempts = inner
                    .failed_attempts
                    .saturating_add(1)
                    .min(self.config.max_attempts);
                inner.last_failure = Some(self.clock.now());
                let attempts_remaining = self.config.max_attempts - inner.failed_attempts;

                warn!(
                    failed_attempts = inner.failed_attempts,
                    attempts_remaining, "Vault unlock failed"
                );
                self.audit.record(
                    AuditEvent::new(AuditEventType::UnlockFailed)
                        .failed("wrong pin")
                        .with_details(serde_json::json!({ "attempts_remaining": attempts_remaining })),
                );
                if attempts_remaining == 0 {
                    warn!("Maximum unlock attempts reached");
                    self.audit.record(AuditEvent::new(AuditEventType::LockoutReached));
                }

                Err(VaultError::WrongPin { attempts_remaining })
            }
            Err(CryptoError::Malformed(field)) => {
                warn!(field, "Stored vault blob is malformed");
                Err(VaultError::Corrupt)
            }
            Err(e) => Err(VaultError::Crypto(e)),
        }
    }

    /// Lock from any state.
    pub async fn lock(&self) {
        let mut inner = self.inner.lock().await;
        self.lock_inner(&mut inner, Some(AuditEventType::Locked));
    }

    fn lock_inner(&self, inner: &mut SessionInner, reason: Option<AuditEventType>) {
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        let was_unlocked = inner.seed.take().is_some();
        if was_unlocked {
            if let Some(reason) = reason {
                info!(reason = ?reason, "Vault locked");
                self.audit.record(AuditEvent::new(reason));
            }
        }
    }

    // ========== Activity / Timeout ==========

    /// Note user activity. Ignored while locked; returns whether it applied.
    pub async fn record_activity(&self, signal: ActivitySignal) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state() != LockState::Unlocked {
            return false;
        }
        inner.last_activity = self.clock.now();
        debug!(signal = ?signal, "Vault activity");
        true
    }

    /// Lock if the idle timeout has elapsed. Returns `true` if this call
    /// locked the vault.
    pub async fn check_timeout(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.expire_if_idle(&mut inner)
    }

    fn expire_if_idle(&self, inner: &mut SessionInner) -> bool {
        if inner.state() != LockState::Unlocked {
            return false;
        }
        let idle = self.clock.now().duration_since(inner.last_activity);
        if idle >= self.config.idle_timeout {
            self.lock_inner(inner, Some(AuditEventType::AutoLocked));
            return true;
        }
        false
    }

    fn arm_timer(&self, inner: &mut SessionInner) {
        if let Some(previous) = inner.timer.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        inner.timer = Some(token.clone());
        tokio::spawn(run_auto_lock(self.me.clone(), token));
    }

    /// Time left before the session idles out, `None` once this timer is
    /// cancelled or the vault is locked.
    async fn remaining(&self, token: &CancellationToken) -> Option<Duration> {
        let inner = self.inner.lock().await;
        if token.is_cancelled() || inner.state() != LockState::Unlocked {
            return None;
        }
        let idle = self.clock.now().duration_since(inner.last_activity);
        Some(self.config.idle_timeout.saturating_sub(idle))
    }

    async fn expire_for(&self, token: &CancellationToken) -> bool {
        let mut inner = self.inner.lock().await;
        if token.is_cancelled() {
            return true;
        }
        self.expire_if_idle(&mut inner)
    }

    // ========== Accessors ==========

    /// The held seed while unlocked, `None` while locked.
    pub async fn mnemonic(&self) -> Option<SecretSeed> {
        self.inner.lock().await.seed.clone()
    }

    pub async fn is_unlocked(&self) -> bool {
        self.inner.lock().await.state() == LockState::Unlocked
    }

    pub async fn status(&self) -> VaultStatus {
        let inner = self.inner.lock().await;
        let max = self.config.max_attempts;
        VaultStatus {
            state: inner.state(),
            has_wallet: inner.has_wallet,
            failed_attempts: inner.failed_attempts,
            attempts_remaining: max.saturating_sub(inner.failed_attempts),
            max_attempts: max,
            locked_out: inner.failed_attempts >= max,
        }
    }

    pub async fn reset_failed_attempts(&self) {
        let mut inner = self.inner.lock().await;
        inner.failed_attempts = 0;
        inner.last_failure = None;
    }
}

/// Sleeps until the idle deadline, re-reading it after each wake so
/// activity in the meantime pushes the deadline out.
async fn run_auto_lock(vault: Weak<SessionVault>, token: CancellationToken) {
    loop {
        let remaining = match vault.upgrade() {
            Some(vault) => vault.remaining(&token).await,
            None => None,
        };
        let Some(remaining) = remaining else {
            return;
        };

        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = token.cancelled() => return,
        }

        let expired = match vault.upgrade() {
            Some(vault) => vault.expire_for(&token).await,
            None => true,
        };
        if expired {
            return;
        }
    }
}
