//! The relay session: the long-lived receive loop driving the connection.
//!
//! One task owns the read half of the bus connection for its lifetime,
//! feeding every inbound frame through the normalizer and the destination
//! router, and re-entering the reconnect cycle whenever the transport
//! fails. The shutdown signal is checked once per outer iteration; closing
//! the transport is what unblocks a receive in progress.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff;
use crate::conn::ConnectionManager;
use crate::error::ConnectError;
use crate::normalize::normalize;
use crate::router::DestinationRouter;
use crate::transport::BusFrame;

pub struct RelaySession {
    conn: Arc<ConnectionManager>,
    router: Arc<DestinationRouter>,
    shutdown: watch::Receiver<bool>,
}

/// Controls a spawned relay session.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    conn: Arc<ConnectionManager>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Stops the session: flips the shutdown signal, closes the transport
    /// (awaiting the heartbeat's cancellation), then cancels the loop task
    /// so a blocked receive cannot hold up shutdown.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.conn.close().await;
        self.task.abort();
        if let Err(err) = self.task.await {
            if !err.is_cancelled() {
                error!(error = %err, "relay task ended abnormally");
            }
        }
    }
}

/// Spawns the relay session as a background task.
pub fn spawn(conn: Arc<ConnectionManager>, router: Arc<DestinationRouter>) -> RelayHandle {
    let (tx, rx) = watch::channel(false);
    let session = RelaySession {
        conn: Arc::clone(&conn),
        router,
        shutdown: rx,
    };
    let task = tokio::spawn(session.run());
    RelayHandle {
        shutdown: tx,
        conn,
        task,
    }
}

impl RelaySession {
    pub fn new(
        conn: Arc<ConnectionManager>,
        router: Arc<DestinationRouter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            conn,
            router,
            shutdown,
        }
    }

    /// Runs until the shutdown signal is observed. Survives every
    /// connection-level failure; nothing in here is fatal.
    pub async fn run(self) {
        info!("relay session started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let mut stream = match self.conn.connect().await {
                Ok(stream) => stream,
                // The circuit breaker cooldown was already served inside
                // the manager; go straight into the next iteration.
                Err(ConnectError::CircuitOpen) => continue,
                Err(_) => {
                    let delay = backoff::jittered(self.conn.retry_delay().await);
                    debug!(delay_ms = delay.as_millis() as u64, "backing off before reconnect");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            // Listening: frames are processed strictly in arrival order
            // within this connection epoch.
            while let Some(item) = stream.next().await {
                match item {
                    Ok(BusFrame::Text(raw)) => self.handle_frame(&raw).await,
                    Ok(BusFrame::Close) => {
                        warn!("bus closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "receive failed; reconnecting");
                        break;
                    }
                }
            }

            drop(stream);
            self.conn.drop_connection().await;
        }

        self.conn.close().await;
        info!("relay session stopped");
    }

    /// One frame: normalize, then route. A routing failure is logged and
    /// the frame counts as processed; the connection stays open.
    async fn handle_frame(&self, raw: &str) {
        debug!(frame = raw, "received frame");
        let message = normalize(raw);
        if let Err(err) = self.router.relay(&message).await {
            error!(error = %err, "failed to relay message into the conversation");
        }
    }
}
