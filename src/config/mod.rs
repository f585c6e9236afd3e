//! Settings store for MCollective client and server configuration files.
//!
//! MCollective configuration is a flat list of `key = value` lines with
//! dot-namespaced keys (`plugin.activemq.pool.1.host`). The [`Settings`]
//! store keeps them as strings and computes typed views on read; nothing is
//! ever written back.

pub mod params;

use crate::error::{Error, Result};
use crate::plugin::PluginRegistry;
use crate::security::SecurityProvider;
use crate::serializers::Serializer;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only key/value settings resolved from MCollective configuration.
///
/// Keys are case-sensitive dotted strings; values are stored as the raw
/// strings found in the source text. Typed accessors ([`get_int`],
/// [`get_bool`], ...) convert on every call.
///
/// [`get_int`]: Settings::get_int
/// [`get_bool`]: Settings::get_bool
///
/// # Examples
///
/// ```rust
/// use marionette::config::Settings;
///
/// let settings = Settings::from_text("connector = stomp\nttl = 120\n").unwrap();
/// assert_eq!(settings.get("connector").unwrap(), "stomp");
/// assert_eq!(settings.get_int("ttl").unwrap(), 120);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Create a settings store from an in-memory mapping.
    #[must_use]
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Parse raw `key = value` configuration text.
    ///
    /// Blank lines and `#` comments are skipped. Duplicate keys keep the
    /// last value seen, matching how MCollective reads its own files.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a line without a `=` separator.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut values = HashMap::new();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| Error::Configuration {
                message: format!("invalid settings line {}: {line:?}", number + 1),
            })?;
            values.insert(key.trim().to_string(), value.trim().to_string());
        }

        debug!(keys = values.len(), "parsed settings text");
        Ok(Self { values })
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the file cannot be read or a line
    /// cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("failed to read settings file {}: {e}", path.display()),
        })?;

        info!(path = %path.display(), "loading settings file");
        Self::from_text(&text)
    }

    /// Get an option by key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if the key is absent.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingKey { key: key.to_string() })
    }

    /// Get an option by key, falling back to `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values.get(key).map_or(default, String::as_str)
    }

    /// Get an option by key, or `None` when absent.
    #[must_use]
    pub fn get_optional(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get an integer option by key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if the key is absent and
    /// [`Error::Configuration`] if the value does not parse.
    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.parse_int(key, self.get(key)?)
    }

    /// Get an integer option by key, falling back to `default` when absent.
    ///
    /// A present but malformed value is still an error; the default only
    /// covers the missing-key case.
    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.values.get(key) {
            Some(value) => self.parse_int(key, value),
            None => Ok(default),
        }
    }

    /// Get a float option by key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if the key is absent and
    /// [`Error::Configuration`] if the value does not parse.
    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.parse_float(key, self.get(key)?)
    }

    /// Get a float option by key, falling back to `default` when absent.
    pub fn get_float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.values.get(key) {
            Some(value) => self.parse_float(key, value),
            None => Ok(default),
        }
    }

    /// Get a boolean option by key.
    ///
    /// `true`, `y` and `1` (case-insensitive) are true; every other value
    /// is false.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if the key is absent.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(Self::parse_bool(self.get(key)?))
    }

    /// Get a boolean option by key, falling back to `default` when absent.
    #[must_use]
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.values.get(key).map_or(default, |v| Self::parse_bool(v))
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of configured keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the configured keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Instantiate the connector selected by the `connector` key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `connector` is not configured and
    /// [`Error::UnknownPlugin`] if the named plugin is not registered.
    pub fn connector(
        &self,
        registry: &PluginRegistry,
        transport: Box<dyn crate::transport::Transport>,
        ids: Arc<crate::connector::SubscriptionIds>,
    ) -> Result<crate::connector::Connector> {
        registry.connector(self, transport, ids)
    }

    /// Instantiate the security provider selected by the
    /// `securityprovider` key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `securityprovider` is not configured
    /// and [`Error::UnknownPlugin`] if the named plugin is not registered.
    pub fn security_provider(
        &self,
        registry: &PluginRegistry,
    ) -> Result<Arc<dyn SecurityProvider>> {
        registry.security_provider(self.get("securityprovider")?, self)
    }

    /// Instantiate the serializer named by the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `key` is not configured and
    /// [`Error::UnknownPlugin`] if the named plugin is not registered.
    pub fn serializer(
        &self,
        registry: &PluginRegistry,
        key: &str,
    ) -> Result<Arc<dyn Serializer>> {
        registry.serializer(self.get(key)?)
    }

    fn parse_int(&self, key: &str, value: &str) -> Result<i64> {
        value.trim().parse().map_err(|_| Error::Configuration {
            message: format!("invalid integer for {key}: {value:?}"),
        })
    }

    fn parse_float(&self, key: &str, value: &str) -> Result<f64> {
        value.trim().parse().map_err(|_| Error::Configuration {
            message: format!("invalid float for {key}: {value:?}"),
        })
    }

    fn parse_bool(value: &str) -> bool {
        matches!(value.to_ascii_lowercase().as_str(), "true" | "y" | "1")
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
