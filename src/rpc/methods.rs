// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Methods the wallet provider accepts from pages.

/// Exact method identifiers advertised to pages.
pub const SUPPORTED_METHODS: [&str; 11] = [
    "getAddresses",
    "stx_signMessage",
    "stx_transferStx",
    "stx_transferSip10Ft",
    "stx_signTransaction",
    "stx_signStructuredMessage",
    "stx_getAddresses",
    "stx_deployContract",
    "stx_callContract",
    "signPsbt",
    "sendTransfer",
];

/// Returns `true` if `method` is on the whitelist (case-sensitive).
pub fn is_supported(method: &str) -> bool {
    SUPPORTED_METHODS.contains(&method)
}

/// Owned copy of the whitelist for discovery descriptors.
pub fn supported_methods() -> Vec<String> {
    SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect()
}
