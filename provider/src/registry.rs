//! Provider registry and active-provider selection.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::RateProvider;

/// Boot-time registry of configured rate providers.
///
/// The set is populated once at startup and is read-only afterwards; callers
/// share it behind an `Arc`.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn RateProvider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// Register a provider under its own name. Registering the same name
    /// twice replaces the earlier entry.
    pub fn register(&mut self, provider: Arc<dyn RateProvider>) {
        debug!(provider = provider.name(), "Registering rate provider");
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Set the preferred provider for scheduled synchronization.
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_provider = Some(name.into());
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of all registered providers.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|n| n.as_str()).collect()
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RateProvider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve the provider used for scheduled synchronization: the
    /// configured default when it is registered, otherwise any registered
    /// provider.
    pub fn active_provider(&self) -> ProviderResult<Arc<dyn RateProvider>> {
        if let Some(name) = &self.default_provider {
            if let Some(provider) = self.providers.get(name) {
                return Ok(provider.clone());
            }
        }

        self.providers
            .values()
            .next()
            .cloned()
            .ok_or(ProviderError::NoProviderAvailable)
    }

    /// All registered providers except the named one. Iteration order is
    /// unspecified; the providers are independent.
    pub fn others(&self, exclude: &str) -> Vec<Arc<dyn RateProvider>> {
        self.others_matching(exclude, |_| true)
    }

    /// All registered providers except the named one, restricted to those
    /// matching the predicate.
    pub fn others_matching<F>(&self, exclude: &str, predicate: F) -> Vec<Arc<dyn RateProvider>>
    where
        F: Fn(&dyn RateProvider) -> bool,
    {
        self.providers
            .values()
            .filter(|p| p.name() != exclude)
            .filter(|p| predicate(p.as_ref()))
            .cloned()
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
