//! Liveness pings on the open bus connection.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::transport::{BusFrame, SharedSink};

/// Spawns the heartbeat monitor: ping, sleep, repeat. The loop exits
/// silently as soon as the shared sink is gone or a ping fails or times
/// out; the connection manager aborts any previous instance before
/// spawning a new one, so at most one pinger is live per open connection.
pub(crate) fn spawn(sink: SharedSink, interval: Duration, ping_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let alive = {
                let mut guard = sink.lock().await;
                match guard.as_mut() {
                    Some(sink) => matches!(
                        tokio::time::timeout(ping_timeout, sink.send(BusFrame::Ping)).await,
                        Ok(Ok(()))
                    ),
                    None => false,
                }
            };
            if !alive {
                debug!("heartbeat stopping: connection is gone or ping failed");
                break;
            }
            tokio::time::sleep(interval).await;
        }
    })
}
