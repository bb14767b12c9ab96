use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use vt_telemetry::metrics::{names, MetricsCollector};

use crate::protocol::{CodecError, WireFrame};

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport not connected ({0})")]
    NotConnected(ConnectionState),

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),
}

impl TransportError {
    /// Metric label for a dropped send.
    pub fn reason(&self) -> &'static str {
        match self {
            TransportError::ConnectionClosed => "closed",
            TransportError::NotConnected(_) => "not_connected",
            TransportError::InvalidEndpoint { .. } => "invalid_endpoint",
            TransportError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

// ---------------------------------------------------------------------------
// ConnectionState -- socket lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket exists, or the endpoint could not be used at all.
    Disconnected,
    Connecting,
    Open,
    /// The socket went away. Stays here until the next `connect`.
    Closed,
}

impl ConnectionState {
    pub fn gauge_value(self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closed => 3,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

fn publish(
    state: &watch::Sender<ConnectionState>,
    metrics: &MetricsCollector,
    next: ConnectionState,
) -> ConnectionState {
    metrics.set_gauge(names::CONNECTION_STATE, next.gauge_value());
    state.send_replace(next)
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owns the single outbound websocket to the bridge.
///
/// The socket itself lives on a spawned task. The manager hands it frames
/// through a flume queue and watches its state through a `watch` channel, so
/// `send` never blocks and never awaits. Each `connect` gets a fresh state
/// channel; a task left over from an earlier connection cannot move the
/// current state.
pub struct ConnectionManager {
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: Option<flume::Sender<Message>>,
    task: Option<JoinHandle<()>>,
    endpoint: Option<String>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionManager {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state: Arc::new(state),
            outbound: None,
            task: None,
            endpoint: None,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch the state of the current connection attempt.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Begin opening a socket to `endpoint`, closing any previous one first.
    ///
    /// Returns immediately with `Connecting`, or `Disconnected` when the
    /// endpoint cannot even be turned into a request. Use [`await_ready`]
    /// to learn whether the socket actually opened.
    ///
    /// [`await_ready`]: ConnectionManager::await_ready
    pub fn connect(&mut self, endpoint: &str) -> ConnectionState {
        if self.task.is_some() || self.outbound.is_some() {
            self.close();
        }
        self.endpoint = Some(endpoint.to_string());

        let request = match endpoint.into_client_request() {
            Ok(request) => request,
            Err(e) => {
                let err = TransportError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "bridge transport unavailable");
                self.metrics
                    .increment_counter(names::CONNECT_ATTEMPTS, &[("outcome", "unavailable")]);
                let (state, _) = watch::channel(ConnectionState::Disconnected);
                self.state = Arc::new(state);
                self.metrics.set_gauge(
                    names::CONNECTION_STATE,
                    ConnectionState::Disconnected.gauge_value(),
                );
                return ConnectionState::Disconnected;
            }
        };

        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        self.metrics.set_gauge(
            names::CONNECTION_STATE,
            ConnectionState::Connecting.gauge_value(),
        );
        let (tx, rx) = flume::unbounded();

        debug!(endpoint, "opening bridge socket");
        self.task = Some(tokio::spawn(run_socket(
            request,
            endpoint.to_string(),
            Arc::clone(&state),
            rx,
            Arc::clone(&self.metrics),
        )));
        self.state = state;
        self.outbound = Some(tx);
        ConnectionState::Connecting
    }

    /// Wait until the socket leaves `Connecting`, at most `timeout`.
    /// Returns true only if it reached `Open`.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != ConnectionState::Connecting),
        )
        .await;
        match settled {
            Ok(Ok(state)) => *state == ConnectionState::Open,
            Ok(Err(_)) => false,
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "bridge socket not ready in time");
                false
            }
        }
    }

    /// Queue one frame for the socket. Never blocks.
    ///
    /// Frames offered while the socket is not open are dropped. A socket that
    /// has closed reports [`TransportError::ConnectionClosed`] so the caller
    /// can tear down.
    pub fn send(&self, frame: &WireFrame) -> Result<()> {
        let result = self.enqueue(frame);
        match &result {
            Ok(()) => self
                .metrics
                .increment_counter(names::FRAMES_SENT, &[("kind", frame.kind())]),
            Err(e) => {
                debug!(error = %e, kind = frame.kind(), "bridge frame dropped");
                self.metrics
                    .increment_counter(names::SENDS_DROPPED, &[("reason", e.reason())]);
            }
        }
        result
    }

    fn enqueue(&self, frame: &WireFrame) -> Result<()> {
        match self.state() {
            ConnectionState::Open => {
                let text = frame.encode()?;
                let outbound = self
                    .outbound
                    .as_ref()
                    .ok_or(TransportError::ConnectionClosed)?;
                outbound
                    .send(Message::Text(text.into()))
                    .map_err(|_| TransportError::ConnectionClosed)
            }
            ConnectionState::Closed => Err(TransportError::ConnectionClosed),
            other => Err(TransportError::NotConnected(other)),
        }
    }

    /// Release the socket. Frames already queued are still written. Safe to
    /// call repeatedly.
    pub fn close(&mut self) {
        let previous = publish(&self.state, &self.metrics, ConnectionState::Closed);
        self.outbound.take();
        if let Some(task) = self.task.take() {
            if previous == ConnectionState::Connecting {
                task.abort();
            }
        }
        // Detach from the old task so its exit cannot be observed as ours.
        let (state, _) = watch::channel(ConnectionState::Closed);
        self.state = Arc::new(state);
        if previous != ConnectionState::Closed {
            debug!(%previous, "bridge socket closed");
        }
    }

    /// Close and wait up to `timeout` for queued frames to be flushed.
    pub async fn close_gracefully(&mut self, timeout: Duration) {
        let task = self.task.take();
        self.close();
        if let Some(task) = task {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "bridge socket did not drain in time"
                );
            }
        }
    }
}

async fn run_socket(
    request: Request,
    endpoint: String,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: flume::Receiver<Message>,
    metrics: Arc<MetricsCollector>,
) {
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(%endpoint, error = %e, "bridge socket failed to open");
            metrics.increment_counter(names::CONNECT_ATTEMPTS, &[("outcome", "failed")]);
            publish(&state, &metrics, ConnectionState::Closed);
            return;
        }
    };
    metrics.increment_counter(names::CONNECT_ATTEMPTS, &[("outcome", "opened")]);
    publish(&state, &metrics, ConnectionState::Open);
    info!(%endpoint, "bridge socket open");

    let (mut sink, mut incoming) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv_async() => match frame {
                Ok(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        error!(%endpoint, error = %e, "bridge socket write failed");
                        break;
                    }
                }
                Err(_) => {
                    // Manager let go of the socket; say goodbye.
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!(%endpoint, ?frame, "bridge peer closed the socket");
                    break;
                }
                // The bridge never talks back; anything else is ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%endpoint, error = %e, "bridge socket read failed");
                    break;
                }
                None => break,
            },
        }
    }

    publish(&state, &metrics, ConnectionState::Closed);
    info!(%endpoint, "bridge socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Arc::new(MetricsCollector::new()))
    }

    #[test]
    fn fresh_manager_is_disconnected() {
        let m = manager();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(m.endpoint().is_none());
    }

    #[test]
    fn send_before_connect_is_dropped() {
        let m = manager();
        let err = m.send(&WireFrame::heartbeat(true)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::NotConnected(ConnectionState::Disconnected)
        ));
        assert_eq!(
            m.metrics
                .get_counter(names::SENDS_DROPPED, &[("reason", "not_connected")]),
            1
        );
    }

    #[tokio::test]
    async fn invalid_endpoint_stays_disconnected() {
        let mut m = manager();
        assert_eq!(m.connect("not a url"), ConnectionState::Disconnected);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.await_ready(Duration::from_millis(50)).await);
        assert_eq!(
            m.metrics
                .get_counter(names::CONNECT_ATTEMPTS, &[("outcome", "unavailable")]),
            1
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut m = manager();
        m.close();
        m.close();
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(matches!(
            m.send(&WireFrame::heartbeat(false)),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn state_labels() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closed.gauge_value(), 3);
    }
}
