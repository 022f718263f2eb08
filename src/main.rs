// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wallet_relay::api::router;
use wallet_relay::clock::SystemClock;
use wallet_relay::config::RelayConfig;
use wallet_relay::confirm::{ChannelSurface, ConfirmationLaunch, MemorySessionStore};
use wallet_relay::extension::{Extension, ExtensionDeps};
use wallet_relay::handler::UnavailableHandler;
use wallet_relay::logging;
use wallet_relay::storage::{AuditLog, FileStore, StoragePaths};

#[tokio::main]
async fn main() {
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    logging::init(config.log_format);

    let paths = StoragePaths::new(&config.data_dir);
    let storage = FileStore::open(paths.clone()).expect("Failed to open data directory");
    if let Err(e) = storage.health_check() {
        error!(error = %e, data_dir = %config.data_dir.display(), "Data directory is not writable");
        std::process::exit(1);
    }

    let (surface, launches) = ChannelSurface::new();
    let extension = Extension::start(
        &config,
        ExtensionDeps {
            storage: Arc::new(storage),
            session_store: Arc::new(MemorySessionStore::new()),
            surface: Arc::new(surface),
            audit: Arc::new(AuditLog::new(paths)),
            clock: SystemClock::shared(),
        },
    )
    .expect("Failed to start extension");

    let shutdown = extension.shutdown_token();
    tokio::spawn(log_launches(launches, shutdown.clone()));

    let app = router(extension.app_state(Arc::new(UnavailableHandler)));
    let addr = config.bind_addr().expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    info!(%addr, "Wallet relay listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("HTTP server failed");

    extension.shutdown();
}

/// Stand-in for the UI shell: report each surface the popup should open.
async fn log_launches(mut launches: mpsc::Receiver<ConfirmationLaunch>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            launch = launches.recv() => match launch {
                Some(launch) => info!(
                    request_id = %launch.request_id,
                    stored = launch.stored,
                    width = launch.width,
                    height = launch.height,
                    "Confirmation surface requested"
                ),
                None => return,
            },
            _ = shutdown.cancelled() => return,
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}
