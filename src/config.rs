// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for vault storage and audit logs | `./data` |
//! | `HOST` | API bind address | `127.0.0.1` |
//! | `PORT` | API bind port | `8080` |
//! | `EXTENSION_ID` | Identity stamped on runtime messages | `wallet-relay` |
//! | `ALLOWED_ORIGINS` | Comma-separated origin allow-list | `http://localhost,http://127.0.0.1,https://localhost` |
//! | `ORIGIN_MATCH` | `prefix` or `exact` | `prefix` |
//! | `RATE_LIMIT_MAX` | Requests per origin per window | `30` |
//! | `RATE_LIMIT_WINDOW_SECS` | Rate window length | `60` |
//! | `RATE_LIMIT_CAPACITY` | Max tracked origins | `1024` |
//! | `RATE_LIMIT_SWEEP_SECS` | Stale bucket sweep interval | `300` |
//! | `REQUEST_TIMEOUT_SECS` | Provider request timeout | `60` |
//! | `AUTO_LOCK_SECS` | Vault inactivity timeout | `300` |
//! | `MAX_UNLOCK_ATTEMPTS` | Failed unlocks before lockout | `3` |
//! | `CONTENT_EVENT_MIN_INTERVAL_MS` | Page event throttle (`0` disables) | `100` |
//! | `CONFIRMATION_URL` | Base URL of the confirmation surface | `http://127.0.0.1:8080/confirm` |
//! | `API_TOKEN` | Bearer secret for the API (at least 32 chars) | random per start |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::auth::{ApiToken, MIN_TOKEN_LEN};
use crate::logging::LogFormat;
use crate::policy::{rate_limit, OriginMatch, RateLimitConfig, DEFAULT_ALLOWED_ORIGINS};
use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const EXTENSION_ID_ENV: &str = "EXTENSION_ID";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const ORIGIN_MATCH_ENV: &str = "ORIGIN_MATCH";
pub const RATE_LIMIT_MAX_ENV: &str = "RATE_LIMIT_MAX";
pub const RATE_LIMIT_WINDOW_SECS_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const RATE_LIMIT_CAPACITY_ENV: &str = "RATE_LIMIT_CAPACITY";
pub const RATE_LIMIT_SWEEP_SECS_ENV: &str = "RATE_LIMIT_SWEEP_SECS";
pub const REQUEST_TIMEOUT_SECS_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const AUTO_LOCK_SECS_ENV: &str = "AUTO_LOCK_SECS";
pub const MAX_UNLOCK_ATTEMPTS_ENV: &str = "MAX_UNLOCK_ATTEMPTS";
pub const CONTENT_EVENT_MIN_INTERVAL_MS_ENV: &str = "CONTENT_EVENT_MIN_INTERVAL_MS";
pub const CONFIRMATION_URL_ENV: &str = "CONFIRMATION_URL";
pub const API_TOKEN_ENV: &str = "API_TOKEN";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_EXTENSION_ID: &str = "wallet-relay";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_AUTO_LOCK: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_UNLOCK_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONTENT_EVENT_MIN_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CONFIRMATION_URL: &str = "http://127.0.0.1:8080/confirm";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub extension_id: String,
    pub allowed_origins: Vec<String>,
    pub origin_match: OriginMatch,
    pub rate_limit: RateLimitConfig,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
    pub auto_lock: Duration,
    pub max_unlock_attempts: u32,
    pub content_event_min_interval: Duration,
    pub confirmation_url: Url,
    /// Generated at startup when unset.
    pub api_token: Option<ApiToken>,
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Unset or blank variables take
    /// their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let allowed_origins = match var(ALLOWED_ORIGINS_ENV) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        let confirmation_url = match var(CONFIRMATION_URL_ENV) {
            Some(raw) => Url::parse(&raw).map_err(|e| invalid(CONFIRMATION_URL_ENV, &raw, e))?,
            None => Url::parse(DEFAULT_CONFIRMATION_URL)
                .map_err(|e| invalid(CONFIRMATION_URL_ENV, DEFAULT_CONFIRMATION_URL, e))?,
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(
                var(RATE_LIMIT_MAX_ENV),
                RATE_LIMIT_MAX_ENV,
                rate_limit::DEFAULT_MAX_REQUESTS,
            )?,
            window: secs_or(
                var(RATE_LIMIT_WINDOW_SECS_ENV),
                RATE_LIMIT_WINDOW_SECS_ENV,
                rate_limit::DEFAULT_WINDOW,
            )?,
            capacity: parse_or(
                var(RATE_LIMIT_CAPACITY_ENV),
                RATE_LIMIT_CAPACITY_ENV,
                rate_limit::DEFAULT_CAPACITY,
            )?,
        };
        if rate_limit.capacity == 0 {
            return Err(invalid(RATE_LIMIT_CAPACITY_ENV, "0", "must be at least 1"));
        }

        let max_unlock_attempts = parse_or(
            var(MAX_UNLOCK_ATTEMPTS_ENV),
            MAX_UNLOCK_ATTEMPTS_ENV,
            DEFAULT_MAX_UNLOCK_ATTEMPTS,
        )?;
        if max_unlock_attempts == 0 {
            return Err(invalid(MAX_UNLOCK_ATTEMPTS_ENV, "0", "must be at least 1"));
        }

        let content_event_min_interval = match var(CONTENT_EVENT_MIN_INTERVAL_MS_ENV) {
            Some(raw) => Duration::from_millis(parse(&raw, CONTENT_EVENT_MIN_INTERVAL_MS_ENV)?),
            None => DEFAULT_CONTENT_EVENT_MIN_INTERVAL,
        };

        let api_token = match var(API_TOKEN_ENV) {
            Some(raw) => Some(ApiToken::from_configured(&raw).ok_or_else(|| {
                invalid(
                    API_TOKEN_ENV,
                    "[REDACTED]",
                    format!("must be at least {MIN_TOKEN_LEN} characters"),
                )
            })?),
            None => None,
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(var(PORT_ENV), PORT_ENV, DEFAULT_PORT)?,
            extension_id: var(EXTENSION_ID_ENV).unwrap_or_else(|| DEFAULT_EXTENSION_ID.to_string()),
            allowed_origins,
            origin_match: parse_or(var(ORIGIN_MATCH_ENV), ORIGIN_MATCH_ENV, OriginMatch::Prefix)?,
            rate_limit,
            sweep_interval: nonzero_secs_or(
                var(RATE_LIMIT_SWEEP_SECS_ENV),
                RATE_LIMIT_SWEEP_SECS_ENV,
                DEFAULT_SWEEP_INTERVAL,
            )?,
            request_timeout: nonzero_secs_or(
                var(REQUEST_TIMEOUT_SECS_ENV),
                REQUEST_TIMEOUT_SECS_ENV,
                DEFAULT_REQUEST_TIMEOUT,
            )?,
            auto_lock: nonzero_secs_or(var(AUTO_LOCK_SECS_ENV), AUTO_LOCK_SECS_ENV, DEFAULT_AUTO_LOCK)?,
            max_unlock_attempts,
            content_event_min_interval,
            confirmation_url,
            api_token,
            log_format: parse_or(var(LOG_FORMAT_ENV), LOG_FORMAT_ENV, LogFormat::Pretty)?,
        })
    }

    /// Socket address the API binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|e| invalid(HOST_ENV, &raw, e))
    }
}

fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(raw: &str, var: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| invalid(var, raw, e))
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse(&raw, var),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => Ok(Duration::from_secs(parse(&raw, var)?)),
        None => Ok(default),
    }
}

fn nonzero_secs_or(
    raw: Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let value = secs_or(raw, var, default)?;
    if value.is_zero() {
        return Err(invalid(var, "0", "must be greater than zero"));
    }
    Ok(value)
}
