//! Convenient access to the commonly used types.

pub use crate::{
    config::params::{
        BrokerKind, ConnectionParams, Credentials, Endpoint, EndpointSsl, ReconnectPolicy,
        SslPoolEntry,
    },
    config::Settings,
    connector::{ConnectionState, Connector, SubscriptionIds},
    error::{Error, Result},
    listener::{EndpointTracker, SingleResponseListener},
    message::{FactFilter, FactOperator, Filter, Message, MessageBuilder},
    plugin::PluginRegistry,
    security::SecurityProvider,
    serializers::Serializer,
    transport::{Transport, TransportListener},
};

// Commonly paired external types
pub use bytes::Bytes;
