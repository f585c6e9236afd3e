//! Listeners the connector hangs on the transport's delivery path.

use crate::config::params::Endpoint;
use crate::transport::TransportListener;
use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Tracks the endpoint the transport actually connected to.
///
/// Pooled brokers may fail over to any pool member, so credential and SSL
/// lookups must run against whatever endpoint the transport ended up on,
/// not the configured primary. The last reported endpoint is kept across
/// disconnects so re-lookups during reconnection still resolve.
#[derive(Debug, Default)]
pub struct EndpointTracker {
    current: Mutex<Option<Endpoint>>,
}

impl EndpointTracker {
    /// Create a tracker with no endpoint recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoint last reported by the transport, if any.
    #[must_use]
    pub fn current(&self) -> Option<Endpoint> {
        self.current.lock().clone()
    }
}

impl TransportListener for EndpointTracker {
    fn on_connected(&self, endpoint: &Endpoint) {
        *self.current.lock() = Some(endpoint.clone());
    }
}

/// Collects deliveries for one request/reply exchange.
///
/// The waiting task suspends on [`wait`](SingleResponseListener::wait)
/// until the transport's delivery callback releases it or the timeout
/// elapses. Only the first delivery is guaranteed to be captured within
/// the window; later ones are collected best-effort.
#[derive(Debug, Default)]
pub struct SingleResponseListener {
    responses: Mutex<Vec<Bytes>>,
    arrived: Notify,
}

impl SingleResponseListener {
    /// Create an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until at least one response has arrived or `timeout`
    /// elapses. Returns immediately if a response is already buffered.
    pub async fn wait(&self, timeout: Duration) {
        if !self.responses.lock().is_empty() {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.arrived.notified()).await;
    }

    /// Drain the collected responses, in arrival order.
    #[must_use]
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.responses.lock())
    }

    /// Number of responses collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    /// Whether nothing has arrived yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }
}

impl TransportListener for SingleResponseListener {
    fn on_message(&self, body: Bytes) {
        self.responses.lock().push(body);
        // notify_one stores a permit, so a delivery that beats the waiter
        // to the Notify still releases it
        self.arrived.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tracker_records_latest_endpoint() {
        let tracker = EndpointTracker::new();
        assert!(tracker.current().is_none());

        tracker.on_connected(&Endpoint::new("broker1.example.com", 61613));
        tracker.on_connected(&Endpoint::new("broker2.example.com", 61614));
        assert_eq!(tracker.current(), Some(Endpoint::new("broker2.example.com", 61614)));
    }

    #[test]
    fn test_tracker_keeps_endpoint_across_disconnect() {
        let tracker = EndpointTracker::new();
        tracker.on_connected(&Endpoint::new("broker1.example.com", 61613));
        tracker.on_disconnected();
        assert!(tracker.current().is_some());
    }

    #[tokio::test]
    async fn test_wait_released_by_delivery() {
        let listener = Arc::new(SingleResponseListener::new());

        let delivering = Arc::clone(&listener);
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            delivering.on_message(Bytes::from_static(b"pong"));
        });

        listener.wait(Duration::from_secs(5)).await;
        task.await.unwrap();

        assert_eq!(listener.take(), vec![Bytes::from_static(b"pong")]);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_delivered() {
        let listener = SingleResponseListener::new();
        listener.on_message(Bytes::from_static(b"pong"));

        let started = std::time::Instant::now();
        listener.wait(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(listener.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_delivery() {
        let listener = SingleResponseListener::new();
        listener.wait(Duration::from_secs(1)).await;
        assert!(listener.is_empty());
    }
}
