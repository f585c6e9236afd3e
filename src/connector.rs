//! Broker connectors.
//!
//! A [`Connector`] ties the pieces together: it owns the transport handle,
//! keeps an [`EndpointTracker`] on the delivery path so credential and SSL
//! lookups follow failover, resolves its security provider once through the
//! plugin registry, and exposes the connect / send / subscribe / receive /
//! disconnect lifecycle. The three broker variants share all of that logic
//! and differ only in configuration key prefix, virtual-host injection and
//! destination naming, so the variant is a [`BrokerKind`] value rather than
//! a type.

use crate::config::params::{BrokerKind, Endpoint};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::listener::{EndpointTracker, SingleResponseListener};
use crate::message::Message;
use crate::plugin::PluginRegistry;
use crate::security::SecurityProvider;
use crate::transport::{Transport, TransportListener};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Listener slot the endpoint tracker is registered under.
const TRACKER_LISTENER: &str = "tracker";
/// Listener slot a request/reply exchange registers under.
const RESPONSE_LISTENER: &str = "response";

/// Monotonically increasing subscription id source.
///
/// One instance is shared by every connector in the process so
/// subscription ids are unique across all of them, not just within one.
/// The increment is atomic; concurrent connectors never observe the same
/// id.
#[derive(Debug, Default)]
pub struct SubscriptionIds {
    next: AtomicU64,
}

impl SubscriptionIds {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Connection lifecycle state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No protocol-level connection is established
    Unconnected,
    /// The connect handshake has completed
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Stateful façade over one broker connection.
///
/// Construct through the [`PluginRegistry`] (or
/// [`Settings::connector`](crate::config::Settings::connector)); the
/// transport handle is supplied by the caller, with
/// [`Settings::connection_params`](crate::config::Settings::connection_params)
/// providing everything a transport constructor needs. Construction
/// registers the endpoint tracker and applies the configured SSL material,
/// so the transport is ready for its first `start`.
pub struct Connector {
    kind: BrokerKind,
    settings: Settings,
    transport: Box<dyn Transport>,
    tracker: Arc<EndpointTracker>,
    security: Arc<dyn SecurityProvider>,
    ids: Arc<SubscriptionIds>,
    id: Option<u64>,
    state: ConnectionState,
}

impl Connector {
    /// Build a connector for the broker the settings' `connector` key
    /// selects.
    ///
    /// # Errors
    /// Fails on an unsupported broker name, an unresolvable security
    /// provider, or malformed SSL configuration.
    pub fn new(
        settings: Settings,
        transport: Box<dyn Transport>,
        ids: Arc<SubscriptionIds>,
        registry: &PluginRegistry,
    ) -> Result<Self> {
        let kind = settings.broker()?;
        Self::with_kind(kind, settings, transport, ids, registry)
    }

    /// Build a connector bound to an explicit broker kind.
    ///
    /// # Errors
    /// Fails if the security provider cannot be resolved or the SSL pool
    /// configuration is malformed.
    pub fn with_kind(
        kind: BrokerKind,
        settings: Settings,
        transport: Box<dyn Transport>,
        ids: Arc<SubscriptionIds>,
        registry: &PluginRegistry,
    ) -> Result<Self> {
        let security = settings.security_provider(registry)?;

        let tracker = Arc::new(EndpointTracker::new());
        transport.set_listener(TRACKER_LISTENER, Arc::clone(&tracker) as Arc<dyn TransportListener>);

        for entry in settings.ssl_pool()? {
            transport.set_ssl(&entry)?;
        }

        Ok(Self {
            kind,
            settings,
            transport,
            tracker,
            security,
            ids,
            id: None,
            state: ConnectionState::Unconnected,
        })
    }

    /// The broker variant this connector is bound to.
    #[must_use]
    pub fn kind(&self) -> BrokerKind {
        self.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The settings this connector resolves against.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The security provider resolved at construction.
    #[must_use]
    pub fn security(&self) -> Arc<dyn SecurityProvider> {
        Arc::clone(&self.security)
    }

    /// The endpoint the transport last reported binding to.
    #[must_use]
    pub fn current_endpoint(&self) -> Option<Endpoint> {
        self.tracker.current()
    }

    /// This connector's subscription id, claimed from the shared counter
    /// on first use.
    pub fn id(&mut self) -> u64 {
        *self.id.get_or_insert_with(|| self.ids.next_id())
    }

    /// Connect to the middleware.
    ///
    /// No-op when already connected. Otherwise starts the transport, reads
    /// the endpoint it bound to from the tracker, resolves credentials for
    /// that endpoint and performs the connect handshake.
    ///
    /// # Errors
    /// Fails on transport errors or when credentials cannot be resolved
    /// for the current endpoint.
    pub async fn connect(&mut self, wait: bool) -> Result<()> {
        if self.transport.is_connected() {
            debug!(broker = %self.kind, "already connected");
            return Ok(());
        }

        self.transport.start().await?;

        let current = self.tracker.current();
        let credentials = self.settings.credentials(current.as_ref())?;
        self.transport.connect(&credentials, wait).await?;
        self.state = ConnectionState::Connected;

        info!(broker = %self.kind, endpoint = ?current, "connected to middleware");
        Ok(())
    }

    /// Disconnect from the middleware. No-op when not connected.
    ///
    /// # Errors
    /// Fails if the transport-level disconnect fails.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            self.transport.disconnect().await?;
            self.state = ConnectionState::Unconnected;
            info!(broker = %self.kind, "disconnected from middleware");
        }
        Ok(())
    }

    /// Encode `msg` through the security provider and publish it to
    /// `destination`. Fire-and-forget: no acknowledgment is awaited.
    ///
    /// # Errors
    /// Fails if encoding or the transport-level send fails.
    pub async fn send(
        &self,
        msg: &Message,
        destination: &str,
        headers: &[(String, String)],
    ) -> Result<()> {
        let body = self.security.encode(msg)?;
        debug!(destination, bytes = body.len(), "publishing request");
        self.transport.send(destination, body, headers).await
    }

    /// Subscribe to `destination`, lazily claiming the shared subscription
    /// id when none is supplied. Returns the id used.
    ///
    /// # Errors
    /// Fails if the transport-level subscribe fails.
    pub async fn subscribe(&mut self, destination: &str, id: Option<u64>) -> Result<u64> {
        let id = match id {
            Some(id) => id,
            None => self.id(),
        };
        self.transport.subscribe(destination, id).await?;
        debug!(destination, id, "subscribed");
        Ok(id)
    }

    /// Unsubscribe from `destination`. No core-level subscription state is
    /// kept; the operation is delegated to the transport.
    ///
    /// # Errors
    /// Fails if the transport-level unsubscribe fails.
    pub async fn unsubscribe(&mut self, destination: &str) -> Result<()> {
        self.transport.unsubscribe(destination).await
    }

    /// Wait for a single response.
    ///
    /// Installs a one-shot listener and suspends until the transport's
    /// delivery callback releases it or `timeout` elapses. At most one
    /// message is guaranteed captured; anything else delivered inside the
    /// window is returned best-effort.
    ///
    /// # Errors
    /// Returns [`Error::ReceiveTimeout`] when nothing arrived in time, and
    /// decode errors from the security provider otherwise.
    pub async fn receive(&self, timeout: Duration) -> Result<Vec<Message>> {
        let listener = Arc::new(SingleResponseListener::new());
        self.transport.set_listener(RESPONSE_LISTENER, Arc::clone(&listener) as Arc<dyn TransportListener>);

        listener.wait(timeout).await;

        let raw = listener.take();
        if raw.is_empty() {
            return Err(Error::ReceiveTimeout { timeout });
        }

        debug!(count = raw.len(), "collected responses");
        raw.iter().map(|bytes| self.security.decode(bytes)).collect()
    }

    /// The destination agents listen on for requests to `agent` within
    /// `collective`.
    #[must_use]
    pub fn target(&self, agent: &str, collective: &str) -> String {
        match self.kind {
            BrokerKind::Stomp => format!("/topic/{collective}.{agent}.command"),
            BrokerKind::ActiveMq => format!("/topic/{collective}.{agent}.agent"),
            BrokerKind::RabbitMq => format!("/exchange/{collective}_broadcast/{agent}"),
        }
    }

    /// The destination replies to this connector's requests come back on.
    ///
    /// # Errors
    /// Returns [`Error::MissingIdentity`] for brokers whose reply naming
    /// embeds the node identity when the settings cannot supply one.
    pub fn reply_target(&mut self, agent: &str, collective: &str) -> Result<String> {
        if self.kind == BrokerKind::Stomp {
            return Ok(format!("/topic/{collective}.{agent}.reply"));
        }

        let identity =
            self.settings.get("identity").map_err(|_| Error::MissingIdentity)?.to_string();
        let id = self.id();

        Ok(match self.kind {
            BrokerKind::ActiveMq => format!("/queue/{collective}.reply.{identity}_{id}"),
            BrokerKind::RabbitMq => format!("/exchange/{collective}_reply/{identity}_{id}"),
            BrokerKind::Stomp => unreachable!("handled above"),
        })
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::params::Credentials;
    use crate::test_utils::MockTransport;

    fn stomp_settings() -> Settings {
        [
            ("connector", "stomp"),
            ("securityprovider", "none"),
            ("securityprovider.serializer", "json"),
            ("identity", "mco1"),
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
            ("securityprovider", "none"),
            ("securityprovider.serializer", "json"),
            ("identity", "mco1"),
            ("plugin.activemq.pool.size", "2"),
            ("plugin.activemq.pool.1.host", "broker1.example.com"),
            ("plugin.activemq.pool.1.port", "61613"),
            ("plugin.activemq.pool.1.user", "user1"),
            ("plugin.activemq.pool.1.password", "pass1"),
            ("plugin.activemq.pool.2.host", "broker2.example.com"),
            ("plugin.activemq.pool.2.port", "61614"),
            ("plugin.activemq.pool.2.user", "user2"),
            ("plugin.activemq.pool.2.password", "pass2"),
            ("plugin.activemq.pool.2.ssl", "1"),
            ("plugin.activemq.pool.2.ssl.cert", "/certs/client.pem"),
        ]
        .into_iter()
        .collect()
    }

    fn connector(settings: Settings, transport: MockTransport) -> Connector {
        let registry = PluginRegistry::with_defaults();
        Connector::new(
            settings,
            Box::new(transport),
            Arc::new(SubscriptionIds::new()),
            &registry,
        )
        .unwrap()
    }

    #[test]
    fn test_construction_applies_ssl_pool() {
        let transport = MockTransport::with_endpoint(Endpoint::new("broker2.example.com", 61614));
        let _connector = connector(activemq_settings(), transport.clone());

        let entries = transport.ssl_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].endpoint, Endpoint::new("broker2.example.com", 61614));
    }

    #[tokio::test]
    async fn test_connect_uses_tracked_endpoint_credentials() {
        let transport = MockTransport::with_endpoint(Endpoint::new("broker2.example.com", 61614));
        let mut connector = connector(activemq_settings(), transport.clone());

        assert_eq!(connector.state(), ConnectionState::Unconnected);
        connector.connect(true).await.unwrap();

        assert_eq!(connector.state(), ConnectionState::Connected);
        assert_eq!(transport.credentials(), Some(Credentials::new("user2", "pass2")));
        assert_eq!(
            connector.current_endpoint(),
            Some(Endpoint::new("broker2.example.com", 61614))
        );
    }

    #[tokio::test]
    async fn test_connect_is_a_noop_when_connected() {
        let transport = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let mut connector = connector(stomp_settings(), transport.clone());

        connector.connect(true).await.unwrap();
        connector.connect(true).await.unwrap();

        assert_eq!(transport.start_calls(), 1);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_a_noop_when_unconnected() {
        let transport = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let mut connector = connector(stomp_settings(), transport.clone());

        connector.disconnect().await.unwrap();
        assert_eq!(transport.disconnect_calls(), 0);

        connector.connect(true).await.unwrap();
        connector.disconnect().await.unwrap();
        assert_eq!(transport.disconnect_calls(), 1);
        assert_eq!(connector.state(), ConnectionState::Unconnected);
    }

    #[tokio::test]
    async fn test_send_encodes_through_security_provider() {
        let transport = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let connector = connector(stomp_settings(), transport.clone());

        let msg = Message::builder()
            .body("ping")
            .agent("discovery")
            .request_id(Message::generate_request_id())
            .build(connector.settings())
            .unwrap();

        let destination = connector.target("discovery", "mcollective");
        connector.send(&msg, &destination, &[]).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "/topic/mcollective.discovery.command");

        let decoded = connector.security().decode(&sent[0].1).unwrap();
        assert_eq!(decoded.agent(), Some("discovery"));
    }

    #[tokio::test]
    async fn test_subscribe_assigns_shared_ids_across_connectors() {
        let registry = PluginRegistry::with_defaults();
        let ids = Arc::new(SubscriptionIds::new());

        let transport_a = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let mut a = Connector::new(
            stomp_settings(),
            Box::new(transport_a.clone()),
            Arc::clone(&ids),
            &registry,
        )
        .unwrap();

        let transport_b = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let mut b = Connector::new(
            stomp_settings(),
            Box::new(transport_b.clone()),
            Arc::clone(&ids),
            &registry,
        )
        .unwrap();

        let id_a = a.subscribe("/topic/x", None).await.unwrap();
        let id_b = b.subscribe("/topic/y", None).await.unwrap();
        assert!(id_b > id_a, "ids must increase across connectors");

        // the id sticks for the connector's lifetime
        assert_eq!(a.subscribe("/topic/z", None).await.unwrap(), id_a);
        assert_eq!(transport_a.subscriptions(), vec![
            ("/topic/x".to_string(), id_a),
            ("/topic/z".to_string(), id_a),
        ]);

        // an explicit id wins over the shared counter
        assert_eq!(b.subscribe("/topic/w", Some(99)).await.unwrap(), 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out_without_delivery() {
        let transport = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let connector = connector(stomp_settings(), transport.clone());

        let err = connector.receive(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ReceiveTimeout { .. }));
    }

    #[tokio::test]
    async fn test_receive_returns_delivered_message() {
        let transport = MockTransport::with_endpoint(Endpoint::new("localhost", 6163));
        let connector = connector(stomp_settings(), transport.clone());

        let msg = Message::builder()
            .body("pong")
            .agent("discovery")
            .request_id(Message::generate_request_id())
            .build(connector.settings())
            .unwrap();
        let encoded = connector.security().encode(&msg).unwrap();

        let delivering = transport.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            delivering.deliver(encoded);
        });

        let responses = connector.receive(Duration::from_secs(5)).await.unwrap();
        task.await.unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].body(), Some(&serde_json::Value::from("pong")));
    }

    #[test]
    fn test_target_naming_per_broker() {
        let transport = MockTransport::new();
        let registry = PluginRegistry::with_defaults();
        let ids = Arc::new(SubscriptionIds::new());

        let mut stomp = Connector::new(
            stomp_settings(),
            Box::new(MockTransport::new()),
            Arc::clone(&ids),
            &registry,
        )
        .unwrap();
        assert_eq!(stomp.target("package", "mcollective"), "/topic/mcollective.package.command");
        assert_eq!(
            stomp.reply_target("package", "mcollective").unwrap(),
            "/topic/mcollective.package.reply"
        );

        let mut activemq = Connector::new(
            activemq_settings(),
            Box::new(transport.clone()),
            Arc::clone(&ids),
            &registry,
        )
        .unwrap();
        assert_eq!(activemq.target("package", "mcollective"), "/topic/mcollective.package.agent");
        let reply = activemq.reply_target("package", "mcollective").unwrap();
        assert!(reply.starts_with("/queue/mcollective.reply.mco1_"));
    }

    #[test]
    fn test_unknown_security_provider_fails_construction() {
        let settings: Settings = [
            ("connector", "stomp"),
            ("securityprovider", "aes"),
            ("plugin.stomp.host", "localhost"),
            ("plugin.stomp.port", "6163"),
        ]
        .into_iter()
        .collect();
        let registry = PluginRegistry::with_defaults();

        assert!(matches!(
            Connector::new(
                settings,
                Box::new(MockTransport::new()),
                Arc::new(SubscriptionIds::new()),
                &registry,
            ),
            Err(Error::UnknownPlugin { capability: "security provider", .. })
        ));
    }
}
