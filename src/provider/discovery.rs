// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider discovery for a page: the named global and the shared
//! descriptor list dApps enumerate wallets from.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ProviderFacade;
use crate::rpc::methods::supported_methods;

/// Name the façade is registered under.
pub const PROVIDER_GLOBAL: &str = "StacksWallet";

const PROVIDER_ICON: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iNDgiIGhlaWdodD0iNDgiIHZpZXdCb3g9IjAgMCA0OCA0OCIgZmlsbD0ibm9uZSIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iNDgiIGhlaWdodD0iNDgiIHJ4PSIyNCIgZmlsbD0iIzU1NDZGRiIvPjxwYXRoIGQ9Ik0xNiAyMEgyNE0yNCAyMFYyOE0yNCAyMEwzMiAyOE0zMiAyMEwyNCAyOCIgc3Ryb2tlPSJ3aGl0ZSIgc3Ryb2tlLXdpZHRoPSIzIiBzdHJva2UtbGluZWNhcD0icm91bmQiLz48L3N2Zz4=";

/// One entry of the page's provider list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    pub icon: String,
    pub name: String,
    pub web_url: String,
    pub methods: Vec<String>,
}

impl ProviderDescriptor {
    pub fn stacks_wallet() -> Self {
        Self {
            id: PROVIDER_GLOBAL.to_string(),
            icon: PROVIDER_ICON.to_string(),
            name: "Stacks Wallet".to_string(),
            web_url: "https://stacks.co".to_string(),
            methods: supported_methods(),
        }
    }
}

/// Per-page registry of installed providers.
#[derive(Default)]
pub struct ProviderRegistry {
    globals: Mutex<HashMap<String, Arc<ProviderFacade>>>,
    descriptors: Mutex<Vec<ProviderDescriptor>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `facade` under `name` and append its descriptor. Other
    /// wallets' descriptors are kept.
    pub fn register(&self, name: &str, facade: Arc<ProviderFacade>, descriptor: ProviderDescriptor) {
        if let Ok(mut globals) = self.globals.lock() {
            globals.insert(name.to_string(), facade);
        }
        if let Ok(mut descriptors) = self.descriptors.lock() {
            descriptors.push(descriptor);
        }
    }

    /// Add a descriptor without a façade, as another wallet would.
    pub fn announce(&self, descriptor: ProviderDescriptor) {
        if let Ok(mut descriptors) = self.descriptors.lock() {
            descriptors.push(descriptor);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderFacade>> {
        self.globals.lock().ok()?.get(name).cloned()
    }

    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.descriptors
            .lock()
            .map(|descriptors| descriptors.clone())
            .unwrap_or_default()
    }
}
