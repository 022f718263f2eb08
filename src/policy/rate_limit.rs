// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-origin request rate limiting.
//!
//! Each origin owns a fixed window that restarts lazily: the first call
//! after the window has elapsed resets the count to zero. A burst straddling
//! a window boundary can therefore exceed the nominal rate.
//!
//! Buckets live in a bounded LRU so a page cycling through origins cannot
//! grow the map without limit. A periodic sweep drops buckets whose window
//! has already elapsed.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::SharedClock;

/// Requests allowed per origin per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 30;

/// Window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Maximum number of tracked origins.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Count and window start for one origin.
#[derive(Debug, Clone, Copy)]
pub struct RateBucket {
    pub count: u32,
    pub window_start: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<LruCache<String, RateBucket>>,
    config: RateLimitConfig,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            buckets: Mutex::new(LruCache::new(capacity)),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request from `origin` and report whether it is allowed.
    ///
    /// Fails closed if the bucket map is poisoned.
    pub fn check(&self, origin: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return false;
        };

        let bucket = buckets.get_or_insert_mut(origin.to_string(), || RateBucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) > self.config.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count = bucket.count.saturating_add(1);
        bucket.count <= self.config.max_requests
    }

    /// Current bucket for an origin, if tracked.
    pub fn bucket(&self, origin: &str) -> Option<RateBucket> {
        let buckets = self.buckets.lock().ok()?;
        buckets.peek(origin).copied()
    }

    /// Forget one origin's bucket.
    pub fn reset(&self, origin: &str) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.pop(origin);
        }
    }

    /// Forget every bucket.
    pub fn clear(&self) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop buckets whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return 0;
        };

        let stale: Vec<String> = buckets
            .iter()
            .filter(|(_, bucket)| now.duration_since(bucket.window_start) > self.config.window)
            .map(|(origin, _)| origin.clone())
            .collect();

        for origin in &stale {
            buckets.pop(origin);
        }
        stale.len()
    }

    /// Sweep periodically until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(limiter.clone().run_sweeper(interval, shutdown.clone()));
    /// ```
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            "Rate limiter sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let removed = self.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = self.len(), "Swept stale rate buckets");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Rate limiter sweeper shutting down");
                    return;
                }
            }
        }
    }
}
