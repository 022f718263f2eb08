// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Surface Authentication
//!
//! The API listens on localhost, which every web page in the browser can
//! reach. Each `/v1` route therefore requires
//! `Authorization: Bearer <token>`. The token is handed to the confirmation
//! surface with every launch and never travels in a URL.
//!
//! | Failure | Status | `error_code` |
//! |---------|--------|--------------|
//! | no `Authorization` header | 401 | `missing_auth_header` |
//! | not `Bearer <token>` | 401 | `invalid_auth_header` |
//! | wrong token | 401 | `invalid_token` |

use std::fmt;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::Zeroizing;

use crate::state::AppState;

/// Random bytes in a generated token.
pub const TOKEN_BYTES: usize = 32;

/// Shortest token accepted from configuration.
pub const MIN_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("system random number generator failed")]
pub struct TokenError;

/// Bearer secret shared between the API and the confirmation surface.
#[derive(Clone)]
pub struct ApiToken(Zeroizing<String>);

impl ApiToken {
    /// A fresh random token, URL-safe base64 without padding.
    pub fn generate() -> Result<Self, TokenError> {
        let mut bytes = Zeroizing::new([0u8; TOKEN_BYTES]);
        SystemRandom::new()
            .fill(&mut bytes[..])
            .map_err(|_| TokenError)?;
        Ok(Self(Zeroizing::new(Base64UrlUnpadded::encode_string(
            &bytes[..],
        ))))
    }

    /// Wrap a configured token. `None` when it is shorter than
    /// [`MIN_TOKEN_LEN`].
    pub fn from_configured(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        (raw.len() >= MIN_TOKEN_LEN).then(|| Self(Zeroizing::new(raw.to_string())))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison with a presented token.
    pub fn matches(&self, presented: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(presented.as_bytes()))
    }
}

impl PartialEq for ApiToken {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.expose())
    }
}

impl Eq for ApiToken {}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingAuthHeader,
    InvalidAuthHeader,
    InvalidToken,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    error_code: &'static str,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken => "invalid_token",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "Authorization header required",
            AuthError::InvalidAuthHeader => "Authorization header must be a bearer token",
            AuthError::InvalidToken => "Invalid API token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorBody {
            error: self.message(),
            error_code: self.error_code(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Check the bearer token in `headers` against `token`.
pub fn authorize(token: &ApiToken, headers: &HeaderMap) -> Result<(), AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    let presented = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;
    if token.matches(presented.trim()) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

/// Router middleware requiring the surface token on every route it wraps.
pub async fn require_surface_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match authorize(&state.api_token, request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(
                error_code = e.error_code(),
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected unauthenticated API request"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = ApiToken::generate().unwrap();
        let b = ApiToken::generate().unwrap();
        assert_eq!(a.expose().len(), 43);
        assert_ne!(a, b);
        assert_eq!(format!("{a:?}"), "ApiToken([REDACTED])");
    }

    #[test]
    fn configured_token_must_be_long_enough() {
        assert!(ApiToken::from_configured("short").is_none());
        let token = ApiToken::from_configured(&"k".repeat(MIN_TOKEN_LEN)).unwrap();
        assert!(token.matches(&"k".repeat(MIN_TOKEN_LEN)));
        assert!(!token.matches(&"k".repeat(MIN_TOKEN_LEN - 1)));
    }

    #[test]
    fn bearer_header_is_required() {
        let token = ApiToken::generate().unwrap();
        assert_eq!(
            authorize(&token, &HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        );
        assert_eq!(
            authorize(&token, &headers(token.expose())),
            Err(AuthError::InvalidAuthHeader)
        );
        assert_eq!(
            authorize(&token, &headers("Bearer not-the-token")),
            Err(AuthError::InvalidToken)
        );
        let bearer = format!("Bearer {}", token.expose());
        assert_eq!(authorize(&token, &headers(&bearer)), Ok(()));
    }
}
