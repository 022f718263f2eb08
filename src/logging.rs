// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing setup and log sanitization.
//!
//! Envelope payloads are untrusted and may carry secrets (a page can put a
//! seed phrase anywhere in `params`). Anything derived from a payload goes
//! through [`sanitize_for_log`] before it reaches a log line.

use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

/// Field-name fragments whose values are never logged (case-insensitive).
const SENSITIVE_FIELDS: [&str; 10] = [
    "mnemonic",
    "seed",
    "seedPhrase",
    "privateKey",
    "privkey",
    "stxPrivateKey",
    "secretKey",
    "password",
    "pin",
    "secret",
];

pub const REDACTED: &str = "[REDACTED]";
const REDACTED_MNEMONIC: &str = "[REDACTED - possible mnemonic]";
const REDACTED_KEY: &str = "[REDACTED - possible private key]";

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_FIELDS
        .iter()
        .any(|field| key.contains(&field.to_ascii_lowercase()))
}

fn sanitize_str(s: &str) -> Option<&'static str> {
    let words = s.split_whitespace().count();
    if (12..=24).contains(&words) {
        return Some(REDACTED_MNEMONIC);
    }
    if s.len() >= 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(REDACTED_KEY);
    }
    None
}

/// Copy of `value` with secret-looking fields and strings replaced.
pub fn sanitize_for_log(value: &Value) -> Value {
    match value {
        Value::String(s) => match sanitize_str(s) {
            Some(redacted) => Value::String(redacted.to_string()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(sanitize_for_log).collect()),
        Value::Object(fields) => {
            let sanitized: Map<String, Value> = fields
                .iter()
                .map(|(key, field)| {
                    let field = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize_for_log(field)
                    };
                    (key.clone(), field)
                })
                .collect();
            Value::Object(sanitized)
        }
        _ => value.clone(),
    }
}
