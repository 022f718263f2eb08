// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confirmation surface launch.
//!
//! The surface (a popup window in a browser) is opened with a URL. When the
//! pending request made it into the session store the URL carries only its
//! `requestId`; otherwise the full context travels as query parameters,
//! which more observers can see.
//!
//! The API bearer token is handed over beside the URL, never inside it.

use chrono::Utc;
use tokio::sync::mpsc;
use url::{Origin, Url};

use super::store::PendingConfirmation;
use super::CorrelatorError;
use crate::auth::ApiToken;
use crate::rpc::RpcRequest;

/// Popup dimensions.
pub const SURFACE_WIDTH: u32 = 390;
pub const SURFACE_HEIGHT: u32 = 600;

/// Launches waiting to be picked up by the UI shell.
pub const SURFACE_CHANNEL_CAPACITY: usize = 32;

/// Everything needed to open the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationLaunch {
    pub request_id: String,
    pub url: Url,
    /// Whether the context is in the session store rather than the URL.
    pub stored: bool,
    pub width: u32,
    pub height: u32,
    /// Bearer token the surface presents to the API.
    pub api_token: ApiToken,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("confirmation surface is unavailable")]
    Unavailable,
}

pub trait ConfirmationSurface: Send + Sync {
    fn open(&self, launch: ConfirmationLaunch) -> Result<(), SurfaceError>;
}

/// Hands launches to the UI shell over a channel.
pub struct ChannelSurface {
    tx: mpsc::Sender<ConfirmationLaunch>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::Receiver<ConfirmationLaunch>) {
        let (tx, rx) = mpsc::channel(SURFACE_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }
}

impl ConfirmationSurface for ChannelSurface {
    fn open(&self, launch: ConfirmationLaunch) -> Result<(), SurfaceError> {
        self.tx.try_send(launch).map_err(|_| SurfaceError::Unavailable)
    }
}

/// Build the surface URL for `pending`.
pub fn launch_url(base: &Url, pending: &PendingConfirmation, stored: bool) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        if stored {
            query.append_pair("requestId", &pending.request_id);
        } else {
            let payload = serde_json::to_string(&pending.payload).unwrap_or_default();
            query
                .append_pair("tabId", &pending.tab_id.to_string())
                .append_pair("payload", &payload)
                .append_pair("origin", &pending.origin)
                .append_pair("requestId", &pending.request_id);
        }
    }
    url
}

/// The origin the surface's API calls come from. Browser extension
/// schemes have opaque origins in `url`, so those are rebuilt from the
/// scheme and host.
pub fn surface_origin(base: &Url) -> String {
    match base.origin() {
        origin @ Origin::Tuple(..) => origin.ascii_serialization(),
        Origin::Opaque(_) => match base.host_str() {
            Some(host) => format!("{}://{host}", base.scheme()),
            None => "null".to_string(),
        },
    }
}

impl PendingConfirmation {
    /// Rebuild a pending confirmation from a fallback launch URL. The
    /// creation time is not carried, so it is set to now.
    pub fn from_launch_url(url: &Url) -> Result<Self, CorrelatorError> {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        let missing = |name: &'static str| CorrelatorError::InvalidLaunch(name);

        let request_id = param("requestId").ok_or_else(|| missing("requestId"))?;
        let tab_id = param("tabId")
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| missing("tabId"))?;
        let origin = param("origin").ok_or_else(|| missing("origin"))?;
        let payload: RpcRequest = param("payload")
            .and_then(|p| serde_json::from_str(&p).ok())
            .ok_or_else(|| missing("payload"))?;

        Ok(Self {
            request_id,
            payload,
            tab_id,
            origin,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> PendingConfirmation {
        PendingConfirmation {
            request_id: "req-1".to_string(),
            payload: RpcRequest::new("abc", "stx_signMessage", json!({ "message": "a&b=c" })),
            tab_id: 42,
            origin: "http://localhost:3000".to_string(),
            created_at: Utc::now(),
        }
    }

    fn base() -> Url {
        Url::parse("http://127.0.0.1:8080/confirm").unwrap()
    }

    #[test]
    fn stored_launch_carries_only_request_id() {
        let url = launch_url(&base(), &pending(), true);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("requestId".to_string(), "req-1".to_string())]);
        assert!(PendingConfirmation::from_launch_url(&url).is_err());
    }

    #[test]
    fn fallback_launch_round_trips_context() {
        let original = pending();
        let url = launch_url(&base(), &original, false);
        assert_eq!(url.path(), "/confirm");

        let restored = PendingConfirmation::from_launch_url(&url).unwrap();
        assert_eq!(restored.request_id, original.request_id);
        assert_eq!(restored.tab_id, 42);
        assert_eq!(restored.origin, original.origin);
        assert_eq!(restored.payload, original.payload);
    }

    #[test]
    fn surface_origin_covers_extension_schemes() {
        assert_eq!(surface_origin(&base()), "http://127.0.0.1:8080");
        let popup = Url::parse("chrome-extension://abcdefgh/confirm.html").unwrap();
        assert_eq!(surface_origin(&popup), "chrome-extension://abcdefgh");
    }

    #[tokio::test]
    async fn channel_surface_forwards_launches() {
        let (surface, mut rx) = ChannelSurface::new();
        let launch = ConfirmationLaunch {
            request_id: "r".to_string(),
            url: base(),
            stored: true,
            width: SURFACE_WIDTH,
            height: SURFACE_HEIGHT,
            api_token: ApiToken::generate().unwrap(),
        };
        surface.open(launch.clone()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), launch);

        drop(rx);
        assert_eq!(surface.open(launch), Err(SurfaceError::Unavailable));
    }
}
