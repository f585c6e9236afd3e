//! # Marionette
//!
//! Client library for the MCollective (Marionette Collective) orchestration
//! message bus.
//!
//! Marionette builds protocol-conformant request envelopes, resolves one of
//! the STOMP-family broker backends (`stomp`, `activemq`, `rabbitmq`) from
//! flat MCollective configuration, authenticates payloads through a
//! pluggable security provider, serializes them through a pluggable codec,
//! and performs synchronous request/reply exchanges with timeout semantics
//! over a publish/subscribe transport.
//!
//! It is not a broker: no routing, no persistence, no reconnect execution.
//! The wire-level transport is a collaborator behind the
//! [`Transport`](transport::Transport) trait; this crate computes the
//! connection parameters (endpoint pools, credentials, SSL material,
//! reconnect policy) the transport runs with.
//!
//! ## Quick start
//!
//! ```rust
//! use marionette::config::Settings;
//! use marionette::message::{Filter, Message};
//!
//! # fn main() -> marionette::Result<()> {
//! let settings = Settings::from_text(
//!     "connector = activemq\n\
//!      identity = web01.example.com\n\
//!      securityprovider = none\n\
//!      plugin.activemq.pool.size = 1\n\
//!      plugin.activemq.pool.1.host = broker1.example.com\n\
//!      plugin.activemq.pool.1.port = 61613\n",
//! )?;
//!
//! // connection parameters for the transport constructor
//! let params = settings.connection_params()?;
//! assert_eq!(params.endpoints[0].host, "broker1.example.com");
//!
//! // a filtered request envelope
//! let mut filter = Filter::new();
//! filter.add_agent("package").add_fact_matching("country", "/uk/", "==")?;
//!
//! let msg = Message::builder()
//!     .body("ping")
//!     .agent("package")
//!     .request_id(Message::generate_request_id())
//!     .filter(filter)
//!     .build(&settings)?;
//! assert_eq!(msg.sender_id(), Some("web01.example.com"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: settings store and connection parameter resolution
//! - [`plugin`]: name-to-factory registry for every pluggable capability
//! - [`connector`]: broker lifecycle and request/reply
//! - [`message`]: envelope and discovery filter
//! - [`security`] / [`serializers`]: payload capability contracts
//! - [`transport`] / [`listener`]: the collaborator seam and what this
//!   crate hangs on it

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connector;
pub mod error;
pub mod listener;
pub mod message;
pub mod plugin;
pub mod prelude;
pub mod security;
pub mod serializers;
pub mod test_utils;
pub mod transport;

pub use crate::{
    config::Settings,
    connector::{Connector, SubscriptionIds},
    error::{Error, Result},
    message::{Filter, Message, MessageBuilder},
    plugin::PluginRegistry,
};
