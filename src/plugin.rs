//! Plugin registry for connectors, security providers and serializers.
//!
//! Every pluggable capability resolves through one explicit registry: a
//! short name maps to a factory closure, and the core instantiates plugins
//! exclusively through that lookup. New broker, signing or wire-format
//! implementations register a factory at startup; nothing in the core names
//! a concrete implementation anywhere else.

use crate::config::Settings;
use crate::connector::{Connector, SubscriptionIds};
use crate::error::{Error, Result};
use crate::security::{NoneSecurity, SecurityProvider};
use crate::serializers::{JsonSerializer, Serializer, YamlSerializer};
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::Arc;

/// Factory for connector plugins.
pub type ConnectorFactory = Arc<
    dyn Fn(
            &Settings,
            Box<dyn Transport>,
            Arc<SubscriptionIds>,
            &PluginRegistry,
        ) -> Result<Connector>
        + Send
        + Sync,
>;

/// Factory for security provider plugins.
pub type SecurityFactory =
    Arc<dyn Fn(&Settings, &PluginRegistry) -> Result<Arc<dyn SecurityProvider>> + Send + Sync>;

/// Factory for serializer plugins.
pub type SerializerFactory = Arc<dyn Fn() -> Result<Arc<dyn Serializer>> + Send + Sync>;

/// Name-to-factory registry, one namespace per capability.
///
/// Lookups are concurrent; registration can happen at any time, though the
/// usual shape is [`with_defaults`](PluginRegistry::with_defaults) plus a
/// handful of `register_*` calls at process startup.
///
/// # Examples
///
/// ```rust
/// use marionette::plugin::PluginRegistry;
/// use marionette::serializers::{JsonSerializer, Serializer};
/// use std::sync::Arc;
///
/// let registry = PluginRegistry::with_defaults();
/// registry.register_serializer(
///     "compact",
///     Arc::new(|| Ok(Arc::new(JsonSerializer::new()) as Arc<dyn Serializer>)),
/// );
///
/// assert!(registry.serializer("compact").is_ok());
/// assert!(registry.serializer("msgpack").is_err());
/// ```
pub struct PluginRegistry {
    connectors: DashMap<String, ConnectorFactory>,
    security: DashMap<String, SecurityFactory>,
    serializers: DashMap<String, SerializerFactory>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connectors: DashMap::new(),
            security: DashMap::new(),
            serializers: DashMap::new(),
        }
    }

    /// Create a registry pre-populated with the shipped plugins: the
    /// `stomp`, `activemq` and `rabbitmq` connectors, the `none` security
    /// provider, and the `yaml` and `json` serializers.
    #[must_use]
    pub fn with_defaults() -> Self {
        use crate::config::params::BrokerKind;

        let registry = Self::new();

        for kind in [BrokerKind::Stomp, BrokerKind::ActiveMq, BrokerKind::RabbitMq] {
            registry.register_connector(
                kind.as_str(),
                Arc::new(move |settings: &Settings, transport, ids, registry: &PluginRegistry| {
                    Connector::with_kind(kind, settings.clone(), transport, ids, registry)
                }),
            );
        }

        registry.register_security_provider(
            "none",
            Arc::new(|settings: &Settings, registry: &PluginRegistry| {
                Ok(Arc::new(NoneSecurity::new(settings, registry)?) as Arc<dyn SecurityProvider>)
            }),
        );

        registry.register_serializer(
            "yaml",
            Arc::new(|| Ok(Arc::new(YamlSerializer::new()) as Arc<dyn Serializer>)),
        );
        registry.register_serializer(
            "json",
            Arc::new(|| Ok(Arc::new(JsonSerializer::new()) as Arc<dyn Serializer>)),
        );

        registry
    }

    /// Register (or replace) a connector factory under `name`.
    pub fn register_connector(&self, name: impl Into<String>, factory: ConnectorFactory) {
        self.connectors.insert(name.into(), factory);
    }

    /// Register (or replace) a security provider factory under `name`.
    pub fn register_security_provider(&self, name: impl Into<String>, factory: SecurityFactory) {
        self.security.insert(name.into(), factory);
    }

    /// Register (or replace) a serializer factory under `name`.
    pub fn register_serializer(&self, name: impl Into<String>, factory: SerializerFactory) {
        self.serializers.insert(name.into(), factory);
    }

    /// Instantiate the connector the settings' `connector` key selects.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `connector` is not configured,
    /// [`Error::UnknownPlugin`] if the name has no registered factory, or
    /// whatever the factory itself fails with.
    pub fn connector(
        &self,
        settings: &Settings,
        transport: Box<dyn Transport>,
        ids: Arc<SubscriptionIds>,
    ) -> Result<Connector> {
        let name = settings.get("connector")?;
        let factory = self
            .connectors
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownPlugin {
                capability: "connector",
                name: name.to_string(),
            })?;
        factory(settings, transport, ids, self)
    }

    /// Instantiate the security provider registered under `name`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownPlugin`] if the name has no registered
    /// factory, or whatever the factory itself fails with.
    pub fn security_provider(
        &self,
        name: &str,
        settings: &Settings,
    ) -> Result<Arc<dyn SecurityProvider>> {
        let factory = self
            .security
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownPlugin {
                capability: "security provider",
                name: name.to_string(),
            })?;
        factory(settings, self)
    }

    /// Instantiate the serializer registered under `name`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownPlugin`] if the name has no registered
    /// factory, or whatever the factory itself fails with.
    pub fn serializer(&self, name: &str) -> Result<Arc<dyn Serializer>> {
        let factory = self
            .serializers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownPlugin {
                capability: "serializer",
                name: name.to_string(),
            })?;
        factory()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
