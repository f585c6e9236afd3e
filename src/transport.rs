//! Transport collaborator contract.
//!
//! The connector drives a STOMP-family transport through this trait; the
//! concrete implementation (socket handling, wire framing, reconnect
//! execution) lives outside this crate. Tests use
//! [`MockTransport`](crate::test_utils::MockTransport).

use crate::config::params::{Credentials, Endpoint, SslPoolEntry};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Callbacks the transport invokes on its asynchronous delivery path.
///
/// All methods default to no-ops so listeners implement only what they
/// track.
pub trait TransportListener: Send + Sync {
    /// The transport bound a connection to `endpoint`.
    fn on_connected(&self, _endpoint: &Endpoint) {}

    /// A message body arrived on a subscribed destination.
    fn on_message(&self, _body: Bytes) {}

    /// The transport lost or closed its connection.
    fn on_disconnected(&self) {}
}

/// Publish/subscribe transport the connector coordinates.
///
/// Lifecycle: [`start`](Transport::start) brings the socket up (the
/// transport reports the endpoint it actually bound to through
/// [`TransportListener::on_connected`]), then
/// [`connect`](Transport::connect) performs the protocol-level handshake
/// with credentials. SSL material is applied per pool endpoint before the
/// first start.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the protocol-level connection is established.
    fn is_connected(&self) -> bool;

    /// Bring up the underlying connection to one of the configured
    /// endpoints.
    async fn start(&self) -> Result<()>;

    /// Perform the protocol-level connect handshake.
    async fn connect(&self, credentials: &Credentials, wait: bool) -> Result<()>;

    /// Tear the connection down.
    async fn disconnect(&self) -> Result<()>;

    /// Publish `body` to `destination`. Fire-and-forget; headers ride along
    /// unchanged.
    async fn send(&self, destination: &str, body: Bytes, headers: &[(String, String)])
        -> Result<()>;

    /// Subscribe to `destination` under the given subscription id.
    async fn subscribe(&self, destination: &str, id: u64) -> Result<()>;

    /// Drop the subscription on `destination`.
    async fn unsubscribe(&self, destination: &str) -> Result<()>;

    /// Register (or replace) a named listener on the delivery path.
    fn set_listener(&self, name: &str, listener: Arc<dyn TransportListener>);

    /// Look up a previously registered listener.
    fn listener(&self, name: &str) -> Option<Arc<dyn TransportListener>>;

    /// Apply SSL material for one pool endpoint.
    fn set_ssl(&self, entry: &SslPoolEntry) -> Result<()>;
}
