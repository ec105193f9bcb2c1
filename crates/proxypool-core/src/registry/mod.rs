//! Plugin-based provider registry
//!
//! The registry maps provider type names to factories, so the orchestrator
//! resolves configured providers without a hard-coded match on names.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use proxypool_core::registry::ProviderRegistry;
//! use proxypool_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::new();
//! proxypool_provider_zhima::register(&registry);
//!
//! let provider = registry.create_provider(&config)?;
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("zhima", Box::new(ZhimaFactory));
//! }
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{ProviderClient, ProviderClientFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Provider registry
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn ProviderClientFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory under `name`
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn ProviderClientFactory>,
    ) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Create a provider client from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn ProviderClient>)`: Created provider instance
    /// - `Err(Error::Config)`: The provider type is not registered, its
    ///   configuration is invalid, or the factory rejected it
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        config.validate()?;
        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }
}
