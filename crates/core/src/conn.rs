//! Connection lifecycle management.
//!
//! `ConnectionManager` is the only owner of connection state and retry
//! bookkeeping. The receive loop obtains read halves through
//! [`connect`](ConnectionManager::connect); the HTTP path writes through
//! [`send`](ConnectionManager::send); the heartbeat monitor shares the
//! write half. A reconnect performed on the send path parks the fresh read
//! half for the receive loop, so both paths always share one connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::backoff::{RetryPolicy, RetryState};
use crate::error::{ConnectError, SendError, SendOutcome};
use crate::heartbeat;
use crate::transport::{BusConnector, BusFrame, BusStream, ConnectParams, SharedSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

struct Inner {
    state: ConnectionState,
    retry: RetryState,
    /// Read half of a connection opened by a send-path reconnect, waiting
    /// for the receive loop to collect it.
    pending_stream: Option<BusStream>,
    heartbeat: Option<JoinHandle<()>>,
}

pub struct ConnectionManager {
    connector: Arc<dyn BusConnector>,
    policy: RetryPolicy,
    params: ConnectParams,
    inner: Mutex<Inner>,
    sink: SharedSink,
    /// Serializes dial attempts: at most one connect is ever in flight,
    /// so a send-path reconnect can never race the receive loop into a
    /// second simultaneous connection.
    dial: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        policy: RetryPolicy,
        params: ConnectParams,
    ) -> Self {
        Self {
            connector,
            policy,
            params,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                retry: RetryState::default(),
                pending_stream: None,
                heartbeat: None,
            }),
            sink: Arc::new(Mutex::new(None)),
            dial: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The backoff delay appropriate after the most recent failed attempt.
    pub async fn retry_delay(&self) -> Duration {
        let inner = self.inner.lock().await;
        self.policy.next_delay(inner.retry.attempts)
    }

    /// Obtains the read half of an open connection, connecting if needed.
    ///
    /// If the circuit breaker ceiling has been hit, this serves the fixed
    /// cooldown, resets the attempt counter and fails with
    /// [`ConnectError::CircuitOpen`]; the caller retries on its next loop
    /// iteration. On any other failure the attempt counter is bumped and
    /// the caller is expected to sleep the backoff delay before retrying.
    pub async fn connect(&self) -> Result<BusStream, ConnectError> {
        let stale = {
            let mut inner = self.inner.lock().await;
            if inner.state == ConnectionState::Open {
                match inner.pending_stream.take() {
                    // A send-path reconnect already opened this epoch.
                    Some(stream) => return Ok(stream),
                    // Open without a read half means the caller lost its
                    // stream to an error this manager has not seen yet.
                    None => true,
                }
            } else {
                false
            }
        };
        if stale {
            self.drop_connection().await;
        }
        self.establish().await
    }

    async fn establish(&self) -> Result<BusStream, ConnectError> {
        let _permit = self.dial.lock().await;

        // Another path may have opened a fresh epoch while this one
        // waited for the permit; reuse it instead of dialing a second
        // connection.
        let reclaim = {
            let mut inner = self.inner.lock().await;
            if inner.state == ConnectionState::Open {
                match inner.pending_stream.take() {
                    Some(stream) => return Ok(stream),
                    // Open with its read half already handed out: a
                    // stale epoch this caller cannot reuse.
                    None => true,
                }
            } else {
                false
            }
        };
        if reclaim {
            self.drop_connection().await;
        }

        self.dial_new_epoch(true).await
    }

    /// Reconnects on behalf of the send path. The fresh read half is
    /// parked for the receive loop, and when the circuit breaker is open
    /// this fails fast with [`ConnectError::CircuitOpen`] instead of
    /// serving the cooldown; that sleep belongs to the receive loop.
    async fn reconnect_for_send(&self) -> Result<(), ConnectError> {
        // Checked before the dial permit: the receive loop holds the
        // permit while it sleeps the cooldown, and a send must not wait
        // behind that sleep either.
        {
            let mut inner = self.inner.lock().await;
            inner.retry.maybe_reset(&self.policy, Instant::now());
            if inner.retry.at_ceiling(&self.policy) {
                return Err(ConnectError::CircuitOpen);
            }
        }

        let _permit = self.dial.lock().await;

        // Another path connected while this one waited; its sink serves.
        if self.inner.lock().await.state == ConnectionState::Open {
            return Ok(());
        }

        let stream = self.dial_new_epoch(false).await?;
        self.inner.lock().await.pending_stream = Some(stream);
        Ok(())
    }

    /// Dials one new connection epoch. The caller holds the dial permit.
    async fn dial_new_epoch(&self, serve_cooldown: bool) -> Result<BusStream, ConnectError> {
        {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            inner.retry.maybe_reset(&self.policy, now);
            if inner.retry.at_ceiling(&self.policy) {
                inner.state = ConnectionState::Disconnected;
                drop(inner);
                if !serve_cooldown {
                    return Err(ConnectError::CircuitOpen);
                }
                warn!(
                    cooldown_s = self.policy.cooldown.as_secs(),
                    "retry ceiling reached; serving circuit breaker cooldown"
                );
                tokio::time::sleep(self.policy.cooldown).await;
                self.inner.lock().await.retry.attempts = 0;
                return Err(ConnectError::CircuitOpen);
            }
            inner.state = ConnectionState::Connecting;
        }

        match self.connector.connect().await {
            Ok((sink, stream)) => {
                let mut inner = self.inner.lock().await;
                inner.retry.record_success();
                inner.state = ConnectionState::Open;
                if let Some(handle) = inner.heartbeat.take() {
                    handle.abort();
                }
                *self.sink.lock().await = Some(sink);
                inner.heartbeat = Some(heartbeat::spawn(
                    Arc::clone(&self.sink),
                    self.params.heartbeat_interval,
                    self.params.ping_timeout,
                ));
                info!("connected to message bus");
                Ok(stream)
            }
            Err(err) => {
                let mut inner = self.inner.lock().await;
                inner.retry.record_failure(Instant::now());
                inner.state = ConnectionState::Disconnected;
                warn!(
                    attempts = inner.retry.attempts,
                    error = %err,
                    "connect attempt failed"
                );
                Err(err)
            }
        }
    }

    async fn try_send(&self, text: &str) -> Result<(), SendError> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            None => Err(SendError::NotConnected),
            Some(sink) => sink
                .send(BusFrame::Text(text.to_string()))
                .await
                .map_err(SendError::from),
        }
    }

    /// Best-effort send toward the bus: one inline reconnect and one retry
    /// at most, then the message is dropped and the drop is observable.
    /// An open circuit breaker drops the message immediately; the send
    /// path never sleeps the cooldown.
    pub async fn send(&self, text: &str) -> SendOutcome {
        match self.try_send(text).await {
            Ok(()) => return SendOutcome::Delivered,
            Err(SendError::NotConnected) => {
                warn!("no open connection; attempting inline reconnect");
            }
            Err(err) => {
                warn!(error = %err, "send failed; reconnecting once");
                self.drop_connection().await;
            }
        }

        if let Err(err) = self.reconnect_for_send().await {
            error!(error = %err, "inline reconnect failed; message dropped");
            return SendOutcome::Dropped(SendError::Reconnect(err));
        }

        match self.try_send(text).await {
            Ok(()) => SendOutcome::Delivered,
            Err(err) => {
                error!(error = %err, "send failed after reconnect; message dropped");
                self.drop_connection().await;
                SendOutcome::Dropped(err)
            }
        }
    }

    /// Discards the current connection epoch after a transport failure.
    /// The heartbeat self-terminates once the sink is gone, but it is
    /// aborted here as well so a reconnect never races a stale pinger.
    pub async fn drop_connection(&self) {
        {
            let mut guard = self.sink.lock().await;
            *guard = None;
        }
        let mut inner = self.inner.lock().await;
        inner.state = ConnectionState::Disconnected;
        inner.pending_stream = None;
        if let Some(handle) = inner.heartbeat.take() {
            handle.abort();
        }
    }

    /// Idempotent shutdown: awaits the heartbeat's cancellation (no ping
    /// can fire afterwards), then closes the transport within the close
    /// timeout.
    pub async fn close(&self) {
        let heartbeat = {
            let mut inner = self.inner.lock().await;
            inner.state = ConnectionState::Closing;
            inner.pending_stream = None;
            inner.heartbeat.take()
        };
        if let Some(handle) = heartbeat {
            handle.abort();
            let _ = handle.await;
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = tokio::time::timeout(self.params.close_timeout, sink.send(BusFrame::Close))
                .await;
        }

        self.inner.lock().await.state = ConnectionState::Disconnected;
    }
}
