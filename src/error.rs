//! Error types for the marionette client library.

use crate::config::params::{BrokerKind, Endpoint};
use std::time::Duration;
use thiserror::Error;

/// Main error type for marionette operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration key is absent and no default was supplied
    #[error("missing configuration key: {key}")]
    MissingKey {
        /// The dotted key that could not be found
        key: String,
    },

    /// Malformed configuration value or unsupported selection
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// A plugin name has no entry in the registry
    #[error("unknown {capability} plugin: {name}")]
    UnknownPlugin {
        /// Capability namespace the lookup ran against
        capability: &'static str,
        /// The short plugin name that failed to resolve
        name: String,
    },

    /// The given endpoint is not part of the configured broker pool
    #[error("{endpoint} is not in the configuration for the {broker} connector")]
    EndpointNotFound {
        /// Endpoint that was looked up
        endpoint: Endpoint,
        /// Broker whose pool was scanned
        broker: BrokerKind,
    },

    /// A current endpoint is required for pooled brokers
    #[error("a current endpoint is required for the {broker} connector")]
    EndpointRequired {
        /// Broker that demanded the endpoint
        broker: BrokerKind,
    },

    /// Fact filter operator outside the supported set
    #[error("bad filter fact operator: {operator}")]
    BadFilterOperator {
        /// The rejected operator string
        operator: String,
    },

    /// The settings cannot supply an `identity` value
    #[error("configuration does not provide an identity")]
    MissingIdentity,

    /// Invalid message construction or field access
    #[error("invalid message: {message}")]
    InvalidMessage {
        /// Description of the problem
        message: String,
    },

    /// No response arrived within the receive window
    #[error("timed out after {timeout:?} waiting for a response")]
    ReceiveTimeout {
        /// How long the caller waited
        timeout: Duration,
    },

    /// Caller violated an input contract
    #[error("usage error: {message}")]
    Usage {
        /// Description of the violated contract
        message: String,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the codec failure
        message: String,
    },

    /// Security provider failures
    #[error("security provider error: {message}")]
    Security {
        /// Description of the failure
        message: String,
    },

    /// Transport-level failures surfaced by the collaborator
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },
}

/// Result type alias for marionette operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization { message: err.to_string() }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization { message: err.to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Configuration { message: err.to_string() }
    }
}
