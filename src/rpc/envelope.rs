// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request / response envelopes and shape validation.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The only protocol version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error codes used by the relay.
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Shared by "rate limit exceeded" and "request timeout".
    pub const SERVER_ERROR: i64 = -32000;
    pub const UNKNOWN_ERROR: i64 = -31000;
    pub const USER_REJECTED: i64 = 4001;
}

/// Reasons an inbound value is not a usable envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(Option<String>),
    #[error("envelope id is missing or empty")]
    MissingId,
    #[error("envelope method is missing or empty")]
    MissingMethod,
    #[error("response carries both result and error")]
    AmbiguousOutcome,
    #[error("response carries neither result nor error")]
    MissingOutcome,
}

/// A JSON-RPC request as built by the provider façade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Error object carried in a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_supported(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method {method} is not supported"),
        )
    }

    pub fn origin_not_allowed() -> Self {
        Self::new(codes::INVALID_REQUEST, "Origin not allowed")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(codes::SERVER_ERROR, "Rate limit exceeded")
    }

    pub fn timeout() -> Self {
        Self::new(codes::SERVER_ERROR, "Request timeout")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal() -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error")
    }

    pub fn unknown() -> Self {
        Self::new(codes::UNKNOWN_ERROR, "Unknown error")
    }

    pub fn user_rejected() -> Self {
        Self::new(codes::USER_REJECTED, "User rejected the request")
    }
}

/// Either a result value or an error; never both.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcError),
}

/// A JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse", into = "RawResponse")]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<String>,
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: Option<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            RpcOutcome::Result(value) => Ok(value),
            RpcOutcome::Error(error) => Err(error),
        }
    }

    pub fn to_value(&self) -> Value {
        // Serializing a RawResponse of strings and Values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Wire shape of a response; `result` and `error` are validated on conversion.
#[derive(Serialize, Deserialize)]
struct RawResponse {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

/// `"result": null` is a present result, not a missing one.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawResponse> for RpcResponse {
    type Error = EnvelopeError;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        if raw.jsonrpc != JSONRPC_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(Some(raw.jsonrpc)));
        }
        let outcome = match (raw.result, raw.error) {
            (Some(_), Some(_)) => return Err(EnvelopeError::AmbiguousOutcome),
            (None, None) => return Err(EnvelopeError::MissingOutcome),
            (Some(result), None) => RpcOutcome::Result(result),
            (None, Some(error)) => RpcOutcome::Error(error),
        };
        Ok(Self {
            jsonrpc: raw.jsonrpc,
            id: raw.id,
            outcome,
        })
    }
}

impl From<RpcResponse> for RawResponse {
    fn from(response: RpcResponse) -> Self {
        let (result, error) = match response.outcome {
            RpcOutcome::Result(value) => (Some(value), None),
            RpcOutcome::Error(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: response.jsonrpc,
            id: response.id,
            result,
            error,
        }
    }
}

/// Validate an untrusted value as a request envelope.
///
/// Requires an object with `jsonrpc == "2.0"` and non-empty string `id`
/// and `method`. Missing `params` become `null`.
pub fn validate_envelope(value: &Value) -> Result<RpcRequest, EnvelopeError> {
    let obj = value.as_object().ok_or(EnvelopeError::NotAnObject)?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        other => return Err(EnvelopeError::UnsupportedVersion(other.map(str::to_owned))),
    }

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(EnvelopeError::MissingId)?;

    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .filter(|method| !method.is_empty())
        .ok_or(EnvelopeError::MissingMethod)?;

    Ok(RpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: id.to_string(),
        method: method.to_string(),
        params: obj.get("params").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_envelope_is_accepted() {
        let value = json!({"jsonrpc": "2.0", "id": "abc", "method": "getAddresses", "params": {}});
        let request = validate_envelope(&value).unwrap();
        assert_eq!(request.id, "abc");
        assert_eq!(request.method, "getAddresses");
        assert_eq!(request.params, json!({}));
    }

    #[test]
    fn missing_params_become_null() {
        let value = json!({"jsonrpc": "2.0", "id": "abc", "method": "getAddresses"});
        assert_eq!(validate_envelope(&value).unwrap().params, Value::Null);
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert_eq!(
            validate_envelope(&json!("getAddresses")),
            Err(EnvelopeError::NotAnObject)
        );
        assert_eq!(
            validate_envelope(&json!({"jsonrpc": "1.0", "id": "a", "method": "m"})),
            Err(EnvelopeError::UnsupportedVersion(Some("1.0".to_string())))
        );
        assert_eq!(
            validate_envelope(&json!({"id": "a", "method": "m"})),
            Err(EnvelopeError::UnsupportedVersion(None))
        );
        assert_eq!(
            validate_envelope(&json!({"jsonrpc": "2.0", "id": "", "method": "m"})),
            Err(EnvelopeError::MissingId)
        );
        assert_eq!(
            validate_envelope(&json!({"jsonrpc": "2.0", "id": 7, "method": "m"})),
            Err(EnvelopeError::MissingId)
        );
        assert_eq!(
            validate_envelope(&json!({"jsonrpc": "2.0", "id": "a"})),
            Err(EnvelopeError::MissingMethod)
        );
    }

    #[test]
    fn response_wire_format_matches_json_rpc() {
        let ok = RpcResponse::success("abc", json!({"addresses": []}));
        assert_eq!(
            ok.to_value(),
            json!({"jsonrpc": "2.0", "id": "abc", "result": {"addresses": []}})
        );

        let err = RpcResponse::failure(Some("abc".to_string()), RpcError::rate_limited());
        assert_eq!(
            err.to_value(),
            json!({"jsonrpc": "2.0", "id": "abc", "error": {"code": -32000, "message": "Rate limit exceeded"}})
        );
    }

    #[test]
    fn response_requires_exactly_one_outcome() {
        let both = json!({"jsonrpc": "2.0", "id": "a", "result": 1, "error": {"code": 1, "message": "x"}});
        assert!(serde_json::from_value::<RpcResponse>(both).is_err());

        let neither = json!({"jsonrpc": "2.0", "id": "a"});
        assert!(serde_json::from_value::<RpcResponse>(neither).is_err());

        let null_result = json!({"jsonrpc": "2.0", "id": "a", "result": null});
        let parsed: RpcResponse = serde_json::from_value(null_result).unwrap();
        assert_eq!(parsed.outcome, RpcOutcome::Result(Value::Null));
    }

    #[test]
    fn error_response_parses_into_rpc_error() {
        let value = json!({"jsonrpc": "2.0", "id": "a", "error": {"code": -32600, "message": "Origin not allowed"}});
        let parsed: RpcResponse = serde_json::from_value(value).unwrap();
        assert!(parsed.is_error());
        assert_eq!(parsed.into_result(), Err(RpcError::origin_not_allowed()));
    }
}
