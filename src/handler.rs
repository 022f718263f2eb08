// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seam to the derivation / signing layer.
//!
//! The relay never interprets `params` or `result`. An approved request is
//! handed to a [`MethodHandler`] together with the unlocked seed; whatever
//! it returns becomes the response `result`.

use async_trait::async_trait;
use serde_json::Value;

use crate::vault::SecretSeed;

/// One approved call.
#[derive(Debug)]
pub struct MethodCall<'a> {
    pub method: &'a str,
    pub params: &'a Value,
    pub origin: &'a str,
    pub seed: &'a SecretSeed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("method {0} is not supported")]
    Unsupported(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// Internal failure. The detail is logged, never sent to the page.
    #[error("handler failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, call: MethodCall<'_>) -> Result<Value, HandlerError>;
}

/// Handler for deployments without a derivation backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableHandler;

#[async_trait]
impl MethodHandler for UnavailableHandler {
    async fn handle(&self, call: MethodCall<'_>) -> Result<Value, HandlerError> {
        Err(HandlerError::Unsupported(call.method.to_string()))
    }
}
