//! Connection parameter resolution.
//!
//! Turns the flat settings store into transport-ready connection parameters:
//! the ordered endpoint pool, per-endpoint credentials and SSL material, and
//! the reconnect policy handed to the transport. Resolution branches on the
//! broker selected by the `connector` key.
//!
//! Single-host brokers (`stomp`) read two fixed keys; pooled brokers
//! (`activemq`, `rabbitmq`) read `plugin.<broker>.pool.size` and then
//! 1-indexed `plugin.<broker>.pool.<i>.*` keys. Pool order is meaningful:
//! the first endpoint is the primary.

use crate::config::Settings;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroize;

/// Sentinel for brokers that retry forever; transports that need a finite
/// ceiling treat it as "effectively infinite".
pub const UNLIMITED_ATTEMPTS: u64 = u64::MAX;

/// The closed set of supported broker backends.
///
/// Every connector is bound to exactly one broker kind for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Plain STOMP broker, single host, global credentials
    Stomp,
    /// Apache ActiveMQ, pooled hosts with per-host credentials and SSL
    ActiveMq,
    /// RabbitMQ with the STOMP adapter, pooled hosts plus a virtual host
    RabbitMq,
}

impl BrokerKind {
    /// The broker name as it appears in the `connector` settings key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stomp => "stomp",
            Self::ActiveMq => "activemq",
            Self::RabbitMq => "rabbitmq",
        }
    }

    /// Whether this broker reads a 1-indexed host pool rather than a single
    /// fixed host.
    #[must_use]
    pub const fn is_pooled(self) -> bool {
        !matches!(self, Self::Stomp)
    }

    /// Settings key prefix for this broker, e.g. `plugin.activemq.`.
    #[must_use]
    pub fn plugin_prefix(self) -> String {
        format!("plugin.{self}.")
    }

    /// Settings key prefix for this broker's pool, e.g.
    /// `plugin.activemq.pool.`.
    #[must_use]
    pub fn pool_prefix(self) -> String {
        format!("plugin.{self}.pool.")
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stomp" => Ok(Self::Stomp),
            "activemq" => Ok(Self::ActiveMq),
            "rabbitmq" => Ok(Self::RabbitMq),
            other => Err(Error::Configuration {
                message: format!("unsupported broker type: {other:?}"),
            }),
        }
    }
}

/// One broker instance in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// User and password for one broker endpoint.
///
/// The password is wiped from memory on [`Zeroize::zeroize`] and redacted
/// from debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login user
    pub user: String,
    /// Login password
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Zeroize for Credentials {
    fn zeroize(&mut self) {
        self.password.zeroize();
    }
}

/// SSL material for one pool member whose `.ssl` flag is set.
///
/// Applied to the transport before the first connect so failover to this
/// endpoint picks up the right certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslPoolEntry {
    /// Endpoint the material applies to
    pub endpoint: Endpoint,
    /// Client certificate path
    pub cert_file: Option<PathBuf>,
    /// Client key path
    pub key_file: Option<PathBuf>,
    /// CA bundle path
    pub ca_certs: Option<PathBuf>,
}

/// Flat SSL view for a single endpoint (ActiveMQ only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSsl {
    /// Whether SSL is enabled for the endpoint
    pub use_ssl: bool,
    /// Client certificate path
    pub cert_file: Option<PathBuf>,
    /// Client key path
    pub key_file: Option<PathBuf>,
    /// CA bundle path
    pub ca_certs: Option<PathBuf>,
}

/// Reconnect policy parameters passed through to the transport.
///
/// This layer never retries on its own; it only computes the numbers the
/// transport's backoff loop runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Ceiling for the backoff delay
    pub max_delay: Duration,
    /// Attempt ceiling; [`UNLIMITED_ATTEMPTS`] means retry forever
    pub max_attempts: u64,
    /// Overall connect timeout, unbounded when `None`
    pub timeout: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(30),
            max_attempts: UNLIMITED_ATTEMPTS,
            timeout: None,
        }
    }
}

/// The parameter bundle a transport constructor consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Ordered endpoint pool; the first entry is the primary
    pub endpoints: Vec<Endpoint>,
    /// Reconnect policy; `None` for brokers without one (`stomp`)
    pub reconnect: Option<ReconnectPolicy>,
    /// Virtual host, set only for `rabbitmq`
    pub vhost: Option<String>,
}

impl Settings {
    /// Parse the `connector` key into a [`BrokerKind`].
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `connector` is not configured and
    /// [`Error::Configuration`] for an unsupported broker name.
    pub fn broker(&self) -> Result<BrokerKind> {
        self.get("connector")?.parse()
    }

    /// Resolve the ordered endpoint pool for the configured broker.
    ///
    /// `stomp` reads the two fixed `plugin.stomp.host` / `plugin.stomp.port`
    /// keys and yields exactly one endpoint. Pooled brokers read
    /// `plugin.<broker>.pool.size` = N and then the 1-indexed host/port
    /// keys, in index order. A missing indexed key is a hard configuration
    /// error, never a silent skip.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let broker = self.broker()?;

        if !broker.is_pooled() {
            return Ok(vec![Endpoint::new(
                self.get("plugin.stomp.host")?,
                self.port_value("plugin.stomp.port")?,
            )]);
        }

        let prefix = broker.pool_prefix();
        let size = self.get_int(&format!("{prefix}size"))?;

        let mut endpoints = Vec::with_capacity(size.max(0) as usize);
        for index in 1..=size {
            endpoints.push(Endpoint::new(
                self.get(&format!("{prefix}{index}.host"))?,
                self.port_value(&format!("{prefix}{index}.port"))?,
            ));
        }

        Ok(endpoints)
    }

    /// Resolve the credentials for `current`.
    ///
    /// For `stomp` the two global keys are returned unconditionally and
    /// `current` is ignored. For pooled brokers the pool is scanned by index
    /// for an endpoint equal to `current` and the credentials stored at the
    /// matching index are returned.
    ///
    /// # Errors
    /// - [`Error::EndpointRequired`] if a pooled broker is configured and
    ///   `current` is `None` (caller misuse, not a configuration problem)
    /// - [`Error::EndpointNotFound`] if `current` is not in the pool
    ///   (stale or foreign failover state)
    /// - [`Error::MissingKey`] if the matching index lacks user/password
    pub fn credentials(&self, current: Option<&Endpoint>) -> Result<Credentials> {
        let broker = self.broker()?;

        if !broker.is_pooled() {
            return Ok(Credentials::new(
                self.get("plugin.stomp.user")?,
                self.get("plugin.stomp.password")?,
            ));
        }

        let current = current.ok_or(Error::EndpointRequired { broker })?;
        let prefix = broker.pool_prefix();

        for (index, endpoint) in self.endpoints()?.iter().enumerate() {
            if endpoint == current {
                let index = index + 1;
                return Ok(Credentials::new(
                    self.get(&format!("{prefix}{index}.user"))?,
                    self.get(&format!("{prefix}{index}.password"))?,
                ));
            }
        }

        Err(Error::EndpointNotFound { endpoint: current.clone(), broker })
    }

    /// Collect the SSL material for every pool member with `.ssl` enabled.
    ///
    /// Yields one [`SslPoolEntry`] per enabled index, in index order, each
    /// carrying its own (optional) certificate, key and CA paths. Empty for
    /// `stomp`, which has no SSL key layout.
    pub fn ssl_pool(&self) -> Result<Vec<SslPoolEntry>> {
        let broker = self.broker()?;
        if !broker.is_pooled() {
            return Ok(Vec::new());
        }

        let prefix = broker.pool_prefix();
        let mut entries = Vec::new();

        for (index, endpoint) in self.endpoints()?.into_iter().enumerate() {
            let ssl_prefix = format!("{prefix}{}.ssl", index + 1);
            if !self.get_bool_or(&ssl_prefix, false) {
                continue;
            }

            entries.push(SslPoolEntry {
                endpoint,
                cert_file: self.path_value(&format!("{ssl_prefix}.cert")),
                key_file: self.path_value(&format!("{ssl_prefix}.key")),
                ca_certs: self.path_value(&format!("{ssl_prefix}.ca")),
            });
        }

        Ok(entries)
    }

    /// Resolve the flat SSL view for `current` (ActiveMQ only).
    ///
    /// # Errors
    /// - [`Error::Usage`] for any broker other than `activemq`
    /// - [`Error::EndpointNotFound`] if `current` is not in the pool; the
    ///   miss policy matches [`Settings::credentials`] so stale failover
    ///   state surfaces instead of silently downgrading to plaintext
    pub fn endpoint_ssl(&self, current: &Endpoint) -> Result<EndpointSsl> {
        let broker = self.broker()?;
        if broker != BrokerKind::ActiveMq {
            return Err(Error::Usage {
                message: format!(
                    "only the activemq connector supports per-endpoint SSL parameters, not {broker}"
                ),
            });
        }

        for (index, endpoint) in self.endpoints()?.iter().enumerate() {
            if endpoint == current {
                let ssl_prefix = format!("{}{}.ssl", broker.pool_prefix(), index + 1);
                return Ok(EndpointSsl {
                    use_ssl: self.get_bool_or(&ssl_prefix, false),
                    cert_file: self.path_value(&format!("{ssl_prefix}.cert")),
                    key_file: self.path_value(&format!("{ssl_prefix}.key")),
                    ca_certs: self.path_value(&format!("{ssl_prefix}.ca")),
                });
            }
        }

        Err(Error::EndpointNotFound { endpoint: current.clone(), broker })
    }

    /// Read the reconnect policy for the configured broker, applying
    /// defaults for absent keys.
    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy> {
        let prefix = self.broker()?.plugin_prefix();
        let defaults = ReconnectPolicy::default();

        let timeout_key = format!("{prefix}timeout");
        let timeout = if self.contains_key(&timeout_key) {
            Some(self.duration_value(&timeout_key)?)
        } else {
            None
        };

        let attempts_key = format!("{prefix}max_reconnect_attempts");
        let max_attempts = if self.contains_key(&attempts_key) {
            u64::try_from(self.get_int(&attempts_key)?).map_err(|_| Error::Configuration {
                message: format!("{attempts_key} must not be negative"),
            })?
        } else {
            UNLIMITED_ATTEMPTS
        };

        Ok(ReconnectPolicy {
            initial_delay: self
                .duration_value_or(&format!("{prefix}initial_reconnect_delay"), defaults.initial_delay)?,
            max_delay: self
                .duration_value_or(&format!("{prefix}max_reconnect_delay"), defaults.max_delay)?,
            max_attempts,
            timeout,
        })
    }

    /// Assemble the full parameter bundle for a transport constructor.
    ///
    /// Always carries the resolved endpoint pool. Pooled brokers add the
    /// reconnect policy; `rabbitmq` additionally injects the virtual host
    /// from `plugin.rabbitmq.vhost` (a required key for that broker).
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        let broker = self.broker()?;
        let endpoints = self.endpoints()?;

        let reconnect = if broker.is_pooled() {
            Some(self.reconnect_policy()?)
        } else {
            None
        };

        let vhost = if broker == BrokerKind::RabbitMq {
            Some(self.get("plugin.rabbitmq.vhost")?.to_string())
        } else {
            None
        };

        Ok(ConnectionParams { endpoints, reconnect, vhost })
    }

    fn port_value(&self, key: &str) -> Result<u16> {
        u16::try_from(self.get_int(key)?).map_err(|_| Error::Configuration {
            message: format!("{key} is not a valid port number"),
        })
    }

    fn path_value(&self, key: &str) -> Option<PathBuf> {
        self.get_optional(key).map(PathBuf::from)
    }

    fn duration_value(&self, key: &str) -> Result<Duration> {
        let seconds = self.get_float(key)?;
        if seconds < 0.0 {
            return Err(Error::Configuration {
                message: format!("{key} must not be negative"),
            });
        }
        Ok(Duration::from_secs_f64(seconds))
    }

    fn duration_value_or(&self, key: &str, default: Duration) -> Result<Duration> {
        if self.contains_key(key) {
            self.duration_value(key)
        } else {
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stomp_settings() -> Settings {
        [
            ("connector", "stomp"),
            ("plugin.stomp.host", "localhost"),
            ("plugin.stomp.port", "6163"),
            ("plugin.stomp.user", "mcollective"),
            ("plugin.stomp.password", "secret"),
        ]
        .into_iter()
        .collect()
    }

    fn activemq_settings() -> Settings {
        [
            ("connector", "activemq"),
            ("plugin.activemq.pool.size", "2"),
            ("plugin.activemq.pool.1.host", "broker1.example.com"),
            ("plugin.activemq.pool.1.port", "61613"),
            ("plugin.activemq.pool.1.user", "user1"),
            ("plugin.activemq.pool.1.password", "pass1"),
            ("plugin.activemq.pool.2.host", "broker2.example.com"),
            ("plugin.activemq.pool.2.port", "61614"),
            ("plugin.activemq.pool.2.user", "user2"),
            ("plugin.activemq.pool.2.password", "pass2"),
            ("plugin.activemq.pool.2.ssl", "true"),
            ("plugin.activemq.pool.2.ssl.cert", "/certs/client.pem"),
            ("plugin.activemq.pool.2.ssl.key", "/certs/client.key"),
            ("plugin.activemq.pool.2.ssl.ca", "/certs/ca.pem"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_broker_parsing() {
        assert_eq!(stomp_settings().broker().unwrap(), BrokerKind::Stomp);
        assert_eq!(activemq_settings().broker().unwrap(), BrokerKind::ActiveMq);

        let unknown: Settings = [("connector", "zeromq")].into_iter().collect();
        assert!(matches!(unknown.broker(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_stomp_single_endpoint() {
        let endpoints = stomp_settings().endpoints().unwrap();
        assert_eq!(endpoints, vec![Endpoint::new("localhost", 6163)]);
    }

    #[test]
    fn test_pooled_endpoints_in_index_order() {
        let endpoints = activemq_settings().endpoints().unwrap();
        assert_eq!(
            endpoints,
            vec![
                Endpoint::new("broker1.example.com", 61613),
                Endpoint::new("broker2.example.com", 61614),
            ]
        );
    }

    #[test]
    fn test_missing_indexed_key_is_hard_error() {
        let mut pairs: Vec<(&str, &str)> = vec![
            ("connector", "activemq"),
            ("plugin.activemq.pool.size", "2"),
            ("plugin.activemq.pool.1.host", "broker1.example.com"),
            ("plugin.activemq.pool.1.port", "61613"),
        ];
        pairs.push(("plugin.activemq.pool.2.port", "61614"));
        let settings: Settings = pairs.into_iter().collect();

        assert!(matches!(
            settings.endpoints(),
            Err(Error::MissingKey { key }) if key == "plugin.activemq.pool.2.host"
        ));
    }

    #[test]
    fn test_stomp_global_credentials() {
        let credentials = stomp_settings().credentials(None).unwrap();
        assert_eq!(credentials, Credentials::new("mcollective", "secret"));
    }

    #[test]
    fn test_pooled_credentials_by_index() {
        let settings = activemq_settings();
        let second = Endpoint::new("broker2.example.com", 61614);

        let credentials = settings.credentials(Some(&second)).unwrap();
        assert_eq!(credentials, Credentials::new("user2", "pass2"));
    }

    #[test]
    fn test_pooled_credentials_require_endpoint() {
        assert!(matches!(
            activemq_settings().credentials(None),
            Err(Error::EndpointRequired { broker: BrokerKind::ActiveMq })
        ));
    }

    #[test]
    fn test_pooled_credentials_unknown_endpoint() {
        let foreign = Endpoint::new("elsewhere.example.com", 61613);
        assert!(matches!(
            activemq_settings().credentials(Some(&foreign)),
            Err(Error::EndpointNotFound { .. })
        ));
    }

    #[test]
    fn test_ssl_pool_only_enabled_members() {
        let entries = activemq_settings().ssl_pool().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.endpoint, Endpoint::new("broker2.example.com", 61614));
        assert_eq!(entry.cert_file.as_deref(), Some(std::path::Path::new("/certs/client.pem")));
        assert_eq!(entry.key_file.as_deref(), Some(std::path::Path::new("/certs/client.key")));
        assert_eq!(entry.ca_certs.as_deref(), Some(std::path::Path::new("/certs/ca.pem")));
    }

    #[test]
    fn test_ssl_pool_empty_for_stomp() {
        assert!(stomp_settings().ssl_pool().unwrap().is_empty());
    }

    #[test]
    fn test_endpoint_ssl() {
        let settings = activemq_settings();

        let plain = settings.endpoint_ssl(&Endpoint::new("broker1.example.com", 61613)).unwrap();
        assert!(!plain.use_ssl);
        assert!(plain.cert_file.is_none());

        let secured = settings.endpoint_ssl(&Endpoint::new("broker2.example.com", 61614)).unwrap();
        assert!(secured.use_ssl);
        assert_eq!(secured.cert_file.as_deref(), Some(std::path::Path::new("/certs/client.pem")));
    }

    #[test]
    fn test_endpoint_ssl_activemq_only() {
        let settings = stomp_settings();
        assert!(matches!(
            settings.endpoint_ssl(&Endpoint::new("localhost", 6163)),
            Err(Error::Usage { .. })
        ));
    }

    #[test]
    fn test_endpoint_ssl_unknown_endpoint() {
        let foreign = Endpoint::new("elsewhere.example.com", 61613);
        assert!(matches!(
            activemq_settings().endpoint_ssl(&foreign),
            Err(Error::EndpointNotFound { .. })
        ));
    }

    #[test]
    fn test_reconnect_policy_defaults() {
        let policy = activemq_settings().reconnect_policy().unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, UNLIMITED_ATTEMPTS);
        assert_eq!(policy.timeout, None);
    }

    #[test]
    fn test_reconnect_policy_overrides() {
        let settings: Settings = [
            ("connector", "activemq"),
            ("plugin.activemq.initial_reconnect_delay", "0.5"),
            ("plugin.activemq.max_reconnect_delay", "60"),
            ("plugin.activemq.max_reconnect_attempts", "5"),
            ("plugin.activemq.timeout", "2.5"),
        ]
        .into_iter()
        .collect();

        let policy = settings.reconnect_policy().unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_connection_params_stomp() {
        let params = stomp_settings().connection_params().unwrap();
        assert_eq!(params.endpoints.len(), 1);
        assert!(params.reconnect.is_none());
        assert!(params.vhost.is_none());
    }

    #[test]
    fn test_connection_params_rabbitmq_vhost() {
        let settings: Settings = [
            ("connector", "rabbitmq"),
            ("plugin.rabbitmq.vhost", "/mcollective"),
            ("plugin.rabbitmq.pool.size", "1"),
            ("plugin.rabbitmq.pool.1.host", "rabbit.example.com"),
            ("plugin.rabbitmq.pool.1.port", "61613"),
        ]
        .into_iter()
        .collect();

        let params = settings.connection_params().unwrap();
        assert_eq!(params.vhost.as_deref(), Some("/mcollective"));
        assert!(params.reconnect.is_some());

        let without_vhost: Settings = [
            ("connector", "rabbitmq"),
            ("plugin.rabbitmq.pool.size", "1"),
            ("plugin.rabbitmq.pool.1.host", "rabbit.example.com"),
            ("plugin.rabbitmq.pool.1.port", "61613"),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            without_vhost.connection_params(),
            Err(Error::MissingKey { key }) if key == "plugin.rabbitmq.vhost"
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials_zeroize() {
        let mut credentials = Credentials::new("user", "hunter2");
        credentials.zeroize();
        assert!(credentials.password.is_empty());
    }
}
