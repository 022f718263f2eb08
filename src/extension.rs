// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Extension Topology
//!
//! Builds the background context once and attaches pages to it.
//!
//! | Task | Lifetime |
//! |------|----------|
//! | background relay | until [`Extension::shutdown`] |
//! | rate limiter sweeper | until [`Extension::shutdown`] |
//! | confirmation expiry sweeper | until [`Extension::shutdown`] |
//! | vault auto-lock timer | per unlocked session |
//! | content relay + façade listener | per [`PageSession`] |

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

use crate::auth::{ApiToken, TokenError};
use crate::clock::SharedClock;
use crate::config::RelayConfig;
use crate::confirm::{ConfirmationCorrelator, ConfirmationSurface, SessionStore};
use crate::handler::MethodHandler;
use crate::page::PageContext;
use crate::policy::{OriginPolicy, RateLimiter};
use crate::provider::{ProviderFacade, ProviderRegistry};
use crate::relay::{BackgroundRelay, ContentRelay, ExtensionRuntime, RelayError, TabId};
use crate::state::AppState;
use crate::storage::{AuditLog, KeyValueStore};
use crate::vault::{SessionVault, VaultConfig, VaultError};

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("vault initialization failed: {0}")]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("API token generation failed: {0}")]
    Token(#[from] TokenError),
}

/// Collaborators supplied by the embedder.
pub struct ExtensionDeps {
    /// Local persistent storage for the vault blob.
    pub storage: Arc<dyn KeyValueStore>,
    /// Session-lifetime storage for pending confirmations.
    pub session_store: Arc<dyn SessionStore>,
    pub surface: Arc<dyn ConfirmationSurface>,
    pub audit: Arc<AuditLog>,
    pub clock: SharedClock,
}

pub struct Extension {
    runtime: Arc<ExtensionRuntime>,
    vault: Arc<SessionVault>,
    correlator: Arc<ConfirmationCorrelator>,
    limiter: Arc<RateLimiter>,
    clock: SharedClock,
    request_timeout: Duration,
    content_event_min_interval: Duration,
    shutdown: CancellationToken,
}

/// One attached tab. Dropping it detaches the page from the extension.
pub struct PageSession {
    pub tab_id: TabId,
    pub page: PageContext,
    pub registry: Arc<ProviderRegistry>,
    pub provider: Arc<ProviderFacade>,
    _relay: DropGuard,
}

impl Extension {
    /// Build the background context and spawn its tasks. Must be called
    /// inside a tokio runtime.
    pub fn start(config: &RelayConfig, deps: ExtensionDeps) -> Result<Self, ExtensionError> {
        let shutdown = CancellationToken::new();
        let (runtime, inbox) = ExtensionRuntime::new(config.extension_id.clone());

        let vault = SessionVault::new(
            deps.storage,
            deps.clock.clone(),
            VaultConfig {
                idle_timeout: config.auto_lock,
                max_attempts: config.max_unlock_attempts,
            },
            deps.audit.clone(),
            shutdown.child_token(),
        )?;

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.clone(),
            deps.clock.clone(),
        ));
        let api_token = match &config.api_token {
            Some(token) => token.clone(),
            None => {
                info!("No API_TOKEN configured, generated one for this run");
                ApiToken::generate()?
            }
        };
        let correlator = Arc::new(
            ConfirmationCorrelator::new(
                deps.session_store,
                deps.surface,
                config.confirmation_url.clone(),
                runtime.clone(),
                api_token,
                deps.audit.clone(),
            )
            .with_expiry(config.request_timeout, deps.clock.clone()),
        );

        let policy =
            OriginPolicy::new(config.allowed_origins.clone()).with_mode(config.origin_match);
        let background = BackgroundRelay::new(
            runtime.clone(),
            policy,
            limiter.clone(),
            correlator.clone(),
            deps.audit,
        );
        tokio::spawn(background.run(inbox, shutdown.child_token()));
        tokio::spawn(
            limiter
                .clone()
                .run_sweeper(config.sweep_interval, shutdown.child_token()),
        );
        tokio::spawn(
            correlator
                .clone()
                .run_sweeper(config.request_timeout, shutdown.child_token()),
        );

        info!(extension_id = %config.extension_id, "Extension started");
        Ok(Self {
            runtime,
            vault,
            correlator,
            limiter,
            clock: deps.clock,
            request_timeout: config.request_timeout,
            content_event_min_interval: config.content_event_min_interval,
            shutdown,
        })
    }

    /// Attach a tab showing `url` at `origin`: its content relay and the
    /// provider façade the page calls.
    pub fn open_page(&self, origin: &str, url: &str) -> Result<PageSession, ExtensionError> {
        let (page, events) = PageContext::new(origin, url);
        let port = self.runtime.connect_tab(origin, url)?;
        let tab_id = port.tab_id();

        let registry = Arc::new(ProviderRegistry::new());
        let provider =
            ProviderFacade::install(page.clone(), &registry, self.request_timeout, &self.shutdown);

        let relay_token = self.shutdown.child_token();
        let relay = ContentRelay::new(
            page.clone(),
            port,
            self.content_event_min_interval,
            self.clock.clone(),
        );
        tokio::spawn(relay.run(events, relay_token.clone()));

        info!(tab_id, origin, "Page attached");
        Ok(PageSession {
            tab_id,
            page,
            registry,
            provider,
            _relay: relay_token.drop_guard(),
        })
    }

    pub fn vault(&self) -> &Arc<SessionVault> {
        &self.vault
    }

    pub fn correlator(&self) -> &Arc<ConfirmationCorrelator> {
        &self.correlator
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn runtime(&self) -> &Arc<ExtensionRuntime> {
        &self.runtime
    }

    /// State for the confirmation surface API.
    pub fn app_state(&self, handler: Arc<dyn MethodHandler>) -> AppState {
        AppState::new(
            self.vault.clone(),
            self.correlator.clone(),
            self.limiter.clone(),
            handler,
        )
    }

    /// Cancel every task the extension spawned.
    pub fn shutdown(&self) {
        info!("Extension shutting down");
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use crate::clock::SystemClock;
    use crate::confirm::{ChannelSurface, ConfirmationLaunch, MemorySessionStore};
    use crate::handler::{HandlerError, MethodCall};
    use crate::rpc::{codes, RpcError};
    use crate::storage::MemoryStore;
    use crate::vault::SecretSeed;

    const DAPP: &str = "http://localhost:3000";
    const PIN: &str = "123456";

    struct Addresses;

    #[async_trait]
    impl MethodHandler for Addresses {
        async fn handle(&self, call: MethodCall<'_>) -> Result<Value, HandlerError> {
            match call.method {
                "getAddresses" => Ok(json!({
                    "addresses": [{ "symbol": "STX", "address": "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7" }]
                })),
                other => Err(HandlerError::Unsupported(other.to_string())),
            }
        }
    }

    fn config() -> RelayConfig {
        let mut config = RelayConfig::from_lookup(|_| None).unwrap();
        config.content_event_min_interval = Duration::ZERO;
        config
    }

    fn start(config: &RelayConfig) -> (Extension, mpsc::Receiver<ConfirmationLaunch>) {
        let (surface, launches) = ChannelSurface::new();
        let extension = Extension::start(
            config,
            ExtensionDeps {
                storage: Arc::new(MemoryStore::new()),
                session_store: Arc::new(MemorySessionStore::new()),
                surface: Arc::new(surface),
                audit: Arc::new(AuditLog::disabled()),
                clock: SystemClock::shared(),
            },
        )
        .unwrap();
        (extension, launches)
    }

    #[tokio::test]
    async fn approved_request_resolves_only_in_its_page() {
        let (extension, mut launches) = start(&config());
        let dapp = extension.open_page(DAPP, "http://localhost:3000/swap").unwrap();
        let bystander = extension
            .open_page("http://127.0.0.1:5173", "http://127.0.0.1:5173/")
            .unwrap();
        let mut bystander_window = bystander.page.subscribe();

        let provider = dapp.registry.get("StacksWallet").unwrap();
        let call = tokio::spawn(async move { provider.request("getAddresses", json!({})).await });

        let launch = launches.recv().await.unwrap();
        let pending = extension.correlator().get(&launch.request_id).unwrap().unwrap();
        assert_eq!(pending.origin, DAPP);
        assert_eq!(pending.tab_id, dapp.tab_id);

        let vault = extension.vault();
        vault
            .create_wallet(SecretSeed::new("twelve words of entropy"), PIN)
            .await
            .unwrap();
        vault.unlock(PIN).await.unwrap();
        let resolution = extension
            .correlator()
            .approve(&launch.request_id, vault, &Addresses)
            .await
            .unwrap();
        assert!(resolution.delivered);

        let result = call.await.unwrap().unwrap();
        assert_eq!(result["addresses"][0]["symbol"], "STX");
        assert!(bystander_window.try_recv().is_err());
        assert_eq!(dapp.provider.pending_requests(), 0);
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected_without_surface() {
        let (extension, mut launches) = start(&config());
        let page = extension
            .open_page("https://evil.example", "https://evil.example/")
            .unwrap();

        let err = page.provider.request("getAddresses", json!({})).await.unwrap_err();
        assert_eq!(err, RpcError::origin_not_allowed());
        assert!(launches.try_recv().is_err());
        assert!(extension.limiter().is_empty());
    }

    #[tokio::test]
    async fn thirty_first_request_in_window_is_rate_limited() {
        let (extension, mut launches) = start(&config());
        let page = extension.open_page(DAPP, "http://localhost:3000/").unwrap();

        let mut calls = Vec::new();
        for _ in 0..30 {
            let provider = page.provider.clone();
            calls.push(tokio::spawn(async move {
                provider.request("getAddresses", json!({})).await
            }));
            launches.recv().await.unwrap();
        }

        let err = page.provider.request("getAddresses", json!({})).await.unwrap_err();
        assert_eq!(err.code, codes::SERVER_ERROR);
        assert_eq!(err.message, "Rate limit exceeded");
        for call in calls {
            call.abort();
        }
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let mut config = config();
        config.request_timeout = Duration::from_millis(50);
        let (extension, mut launches) = start(&config);
        let page = extension.open_page(DAPP, "http://localhost:3000/").unwrap();

        let err = page.provider.request("getAddresses", json!({})).await.unwrap_err();
        assert_eq!(err, RpcError::timeout());
        let launch = launches.recv().await.unwrap();
        assert_eq!(page.provider.pending_requests(), 0);

        // The background side forgets the request too.
        let swept = tokio::time::timeout(Duration::from_secs(2), async {
            while extension.correlator().in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(swept.is_ok());
        assert!(extension.correlator().get(&launch.request_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn rejection_reaches_page_once() {
        let (extension, mut launches) = start(&config());
        let page = extension.open_page(DAPP, "http://localhost:3000/").unwrap();
        let mut window = page.page.subscribe();

        let provider = page.provider.clone();
        let call = tokio::spawn(async move { provider.request("stx_signMessage", json!({})).await });
        let launch = launches.recv().await.unwrap();

        extension.correlator().reject(&launch.request_id).unwrap();
        assert!(extension.correlator().reject(&launch.request_id).is_err());

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code, codes::USER_REJECTED);
        let delivered = window.recv().await.unwrap();
        assert_eq!(delivered.origin, DAPP);
        assert!(window.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsupported_method_never_reaches_extension() {
        let (extension, mut launches) = start(&config());
        let page = extension.open_page(DAPP, "http://localhost:3000/").unwrap();

        let err = page.provider.request("eth_accounts", json!({})).await.unwrap_err();
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert!(launches.try_recv().is_err());
        assert!(extension.limiter().is_empty());
    }
}
