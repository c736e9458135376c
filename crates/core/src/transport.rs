//! Transport seam between the relay and the message bus.
//!
//! The relay core never touches tungstenite types directly beyond this
//! module: a connection is a pair of boxed [`BusFrame`] halves, produced by
//! a [`BusConnector`]. The production connector fetches a fresh client
//! access URL on every attempt and dials the bus over WebSocket; the
//! loopback connector backs integration tests with in-process channels.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        Bytes,
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::{Message as WsMessage, WebSocketConfig},
    },
};

use crate::error::{ConnectError, TransportError};

/// One discrete unit on the bus connection, reduced to what the relay
/// actually handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusFrame {
    Text(String),
    Ping,
    Close,
}

/// Write half of a bus connection.
pub type BusSink = Pin<Box<dyn Sink<BusFrame, Error = TransportError> + Send>>;
/// Read half of a bus connection.
pub type BusStream = Pin<Box<dyn Stream<Item = Result<BusFrame, TransportError>> + Send>>;

/// The single write half shared by the heartbeat monitor and the send path.
pub type SharedSink = Arc<Mutex<Option<BusSink>>>;

/// Source of short-lived client access URLs. Invoked anew on every connect
/// attempt; implementations must not cache across attempts.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn client_access_url(&self) -> anyhow::Result<String>;
}

/// Opens connections to the message bus.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<(BusSink, BusStream), ConnectError>;
}

/// Transport-level connection parameters.
///
/// tungstenite has no automatic interval pinger, so the heartbeat monitor
/// is the single liveness pinger; `heartbeat_interval` is its cadence and
/// `ping_timeout` bounds each ping write.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub heartbeat_interval: Duration,
    pub ping_timeout: Duration,
    pub close_timeout: Duration,
    pub max_frame_bytes: usize,
    /// Identifying headers sent with the handshake request.
    pub headers: Vec<(&'static str, String)>,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
            max_frame_bytes: 10_000_000,
            headers: Vec::new(),
        }
    }
}

fn encode(frame: BusFrame) -> WsMessage {
    match frame {
        BusFrame::Text(text) => WsMessage::Text(text.into()),
        BusFrame::Ping => WsMessage::Ping(Bytes::new()),
        BusFrame::Close => WsMessage::Close(None),
    }
}

fn decode(message: WsMessage) -> Option<BusFrame> {
    match message {
        WsMessage::Text(text) => Some(BusFrame::Text(text.to_string())),
        WsMessage::Binary(data) => {
            Some(BusFrame::Text(String::from_utf8_lossy(&data).into_owned()))
        }
        WsMessage::Close(_) => Some(BusFrame::Close),
        // Pings are answered by the protocol layer; pongs carry no payload
        // the relay cares about.
        _ => None,
    }
}

/// Production connector for a publish/subscribe relay service.
pub struct PubSubConnector {
    tokens: Arc<dyn TokenSource>,
    params: ConnectParams,
}

impl PubSubConnector {
    pub fn new(tokens: Arc<dyn TokenSource>, params: ConnectParams) -> Self {
        Self { tokens, params }
    }
}

#[async_trait]
impl BusConnector for PubSubConnector {
    async fn connect(&self) -> Result<(BusSink, BusStream), ConnectError> {
        // Credentials are short-lived; fetch a fresh one for this attempt.
        let url = self
            .tokens
            .client_access_url()
            .await
            .map_err(ConnectError::Token)?;

        let mut request = url.into_client_request()?;
        for (name, value) in &self.params.headers {
            let value: HeaderValue = value
                .parse()
                .map_err(|_| ConnectError::InvalidHeader((*name).to_string()))?;
            request.headers_mut().insert(*name, value);
        }

        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(self.params.max_frame_bytes))
            .max_frame_size(Some(self.params.max_frame_bytes));

        let (ws, _response) = connect_async_with_config(request, Some(ws_config), false).await?;
        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|frame: BusFrame| future::ready(Ok::<_, TransportError>(encode(frame))));
        let stream = stream.filter_map(|item| {
            future::ready(match item {
                Ok(message) => decode(message).map(Ok),
                Err(err) => Some(Err(TransportError::from(err))),
            })
        });

        Ok((Box::pin(sink) as BusSink, Box::pin(stream) as BusStream))
    }
}

#[derive(Default)]
struct LoopbackInner {
    fail_remaining: u32,
    connects: u32,
    inbound: Option<mpsc::UnboundedSender<Result<BusFrame, TransportError>>>,
    outbound: Option<mpsc::UnboundedReceiver<BusFrame>>,
}

/// An in-process `BusConnector` for development and integration testing.
///
/// Each successful `connect` wires the returned halves to this handle:
/// frames pushed with [`inject`](Self::inject) arrive on the relay's read
/// half, and everything the relay writes is captured for
/// [`drain_outbound`](Self::drain_outbound). Failures can be scripted with
/// [`fail_next`](Self::fail_next).
#[derive(Default)]
pub struct LoopbackConnector {
    inner: Mutex<LoopbackInner>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` connect attempts fail.
    pub async fn fail_next(&self, count: u32) {
        self.inner.lock().await.fail_remaining = count;
    }

    /// Total connect attempts observed, including failed ones.
    pub async fn connects(&self) -> u32 {
        self.inner.lock().await.connects
    }

    /// Pushes a frame onto the relay's read half. Returns false when no
    /// connection epoch is live.
    pub async fn inject(&self, frame: BusFrame) -> bool {
        match &self.inner.lock().await.inbound {
            Some(tx) => tx.unbounded_send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    /// Surfaces a transport error on the relay's read half.
    pub async fn fail_link(&self, error: TransportError) {
        if let Some(tx) = &self.inner.lock().await.inbound {
            let _ = tx.unbounded_send(Err(error));
        }
    }

    /// Severs the current epoch: the relay's read half ends.
    pub async fn drop_link(&self) {
        self.inner.lock().await.inbound = None;
    }

    /// Breaks the write half: the relay's next write fails.
    pub async fn break_outbound(&self) {
        self.inner.lock().await.outbound = None;
    }

    /// Collects every frame the relay has written so far this epoch.
    pub async fn drain_outbound(&self) -> Vec<BusFrame> {
        let mut frames = Vec::new();
        if let Some(rx) = &mut self.inner.lock().await.outbound {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

#[async_trait]
impl BusConnector for LoopbackConnector {
    async fn connect(&self) -> Result<(BusSink, BusStream), ConnectError> {
        let mut inner = self.inner.lock().await;
        inner.connects += 1;
        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(ConnectError::Token(anyhow::anyhow!(
                "scripted connect failure"
            )));
        }

        let (in_tx, in_rx) = mpsc::unbounded();
        let (out_tx, out_rx) = mpsc::unbounded();
        inner.inbound = Some(in_tx);
        inner.outbound = Some(out_rx);

        let sink = out_tx.sink_map_err(|_| TransportError::Closed);
        Ok((Box::pin(sink) as BusSink, Box::pin(in_rx) as BusStream))
    }
}
