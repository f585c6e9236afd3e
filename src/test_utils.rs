//! Test support: an in-memory transport for exercising connectors.

use crate::config::params::{Credentials, Endpoint, SslPoolEntry};
use crate::error::Result;
use crate::transport::{Transport, TransportListener};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Scriptable in-memory transport.
///
/// Records every call the connector makes and lets tests push deliveries
/// through the registered listeners. Clones share state, so a test can keep
/// a handle after moving the transport into a connector.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    endpoint: Mutex<Option<Endpoint>>,
    connected: AtomicBool,
    start_calls: AtomicUsize,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    listeners: Mutex<HashMap<String, Arc<dyn TransportListener>>>,
    ssl: Mutex<Vec<SslPoolEntry>>,
    credentials: Mutex<Option<Credentials>>,
    sent: Mutex<Vec<(String, Bytes)>>,
    subscriptions: Mutex<Vec<(String, u64)>>,
    unsubscriptions: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Create a transport that never reports an endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that reports binding to `endpoint` on start.
    #[must_use]
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        let transport = Self::default();
        *transport.inner.endpoint.lock() = Some(endpoint);
        transport
    }

    /// Push a delivery through every registered listener.
    pub fn deliver(&self, body: Bytes) {
        for listener in self.listeners_snapshot() {
            listener.on_message(body.clone());
        }
    }

    /// Credentials recorded by the last connect handshake.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials.lock().clone()
    }

    /// Every (destination, body) pair published so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.inner.sent.lock().clone()
    }

    /// Every (destination, id) subscription made so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, u64)> {
        self.inner.subscriptions.lock().clone()
    }

    /// Every destination unsubscribed so far.
    #[must_use]
    pub fn unsubscriptions(&self) -> Vec<String> {
        self.inner.unsubscriptions.lock().clone()
    }

    /// SSL entries applied so far.
    #[must_use]
    pub fn ssl_entries(&self) -> Vec<SslPoolEntry> {
        self.inner.ssl.lock().clone()
    }

    /// Number of `start` calls.
    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.inner.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.inner.disconnect_calls.load(Ordering::SeqCst)
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn TransportListener>> {
        self.inner.listeners.lock().values().cloned().collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<()> {
        self.inner.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(endpoint) = self.inner.endpoint.lock().clone() {
            for listener in self.listeners_snapshot() {
                listener.on_connected(&endpoint);
            }
        }
        Ok(())
    }

    async fn connect(&self, credentials: &Credentials, _wait: bool) -> Result<()> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.credentials.lock() = Some(credentials.clone());
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);
        for listener in self.listeners_snapshot() {
            listener.on_disconnected();
        }
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        body: Bytes,
        _headers: &[(String, String)],
    ) -> Result<()> {
        self.inner.sent.lock().push((destination.to_string(), body));
        Ok(())
    }

    async fn subscribe(&self, destination: &str, id: u64) -> Result<()> {
        self.inner.subscriptions.lock().push((destination.to_string(), id));
        Ok(())
    }

    async fn unsubscribe(&self, destination: &str) -> Result<()> {
        self.inner.unsubscriptions.lock().push(destination.to_string());
        Ok(())
    }

    fn set_listener(&self, name: &str, listener: Arc<dyn TransportListener>) {
        self.inner.listeners.lock().insert(name.to_string(), listener);
    }

    fn listener(&self, name: &str) -> Option<Arc<dyn TransportListener>> {
        self.inner.listeners.lock().get(name).cloned()
    }

    fn set_ssl(&self, entry: &SslPoolEntry) -> Result<()> {
        self.inner.ssl.lock().push(entry.clone());
        Ok(())
    }
}
