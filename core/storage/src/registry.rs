//! Transport registry for dynamic transport resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chunksync_common::{Error, Result};

use crate::config::TransportConfig;
use crate::transport::RemoteTransport;

/// Factory function type for creating transports.
pub type TransportFactory = Box<dyn Fn(Value) -> Result<Arc<dyn RemoteTransport>> + Send + Sync>;

/// Registry for transport factories.
///
/// Allows dynamic registration and resolution of transports by provider name
/// and configuration.
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl TransportRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a transport factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: TransportFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Transport '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a transport by name and raw configuration.
    ///
    /// # Errors
    /// - Transport not found
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn RemoteTransport>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Transport '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Resolve the transport described by a typed configuration.
    pub fn resolve_config(&self, config: &TransportConfig) -> Result<Arc<dyn RemoteTransport>> {
        config.validate()?;
        self.resolve(&config.provider, serde_json::to_value(config)?)
    }

    /// Get list of registered transport names.
    pub fn transports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a transport is registered.
    pub fn has_transport(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in transports.
pub fn create_default_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryTransport::new()))),
    );

    registry.factories.insert(
        "local".to_string(),
        Box::new(|config| {
            let config: TransportConfig = serde_json::from_value(config)
                .map_err(|e| Error::Config(format!("Invalid local config: {}", e)))?;
            let root = config
                .root
                .as_deref()
                .filter(|r| !r.is_empty())
                .ok_or_else(|| Error::Config("Local provider requires 'root' path".to_string()))?;
            Ok(Arc::new(crate::local::LocalTransport::new(
                PathBuf::from(root),
                &config.sync_path,
            )))
        }),
    );

    registry.factories.insert(
        "webdav".to_string(),
        Box::new(crate::webdav::create_webdav_transport),
    );

    registry
}
