//! Websocket transport with fixed-interval reconnect.
//!
//! The socket lives in its own task. The session talks to it through two
//! channels: [`ClientMessage`]s go out via a [`TransportHandle`],
//! [`TransportEvent`]s come back on an unbounded receiver. Frames are JSON
//! text; anything else from the peer is ignored.

use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use parley_core::{ClientMessage, ServerMessage, SessionEndpoint, SessionSettings};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

/// What the transport reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection is up; outbound messages will be delivered.
    Opened,

    /// A decoded frame from the peer.
    Message(ServerMessage),

    /// The connection dropped or an attempt failed. A reconnect follows
    /// unless the transport is finished.
    Closed { reason: String },

    /// The transport stopped for good (shutdown or attempts exhausted).
    Finished,
}

/// When and how often to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.reconnect_interval_ms),
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Session-side handle for sending and shutting the transport down.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    outbound: UnboundedSender<ClientMessage>,
    shutdown: CancellationToken,
}

impl TransportHandle {
    pub const fn new(outbound: UnboundedSender<ClientMessage>, shutdown: CancellationToken) -> Self {
        Self { outbound, shutdown }
    }

    /// Queue a message. Messages queued while disconnected are discarded
    /// before the next connection opens.
    pub fn send(&self, message: ClientMessage) {
        let kind = message.kind();
        if self.outbound.send(message).is_err() {
            tracing::debug!(kind, "Transport gone, dropping outbound message");
        }
    }

    /// Close the connection and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Spawns and owns the websocket task.
pub struct WsTransport;

impl WsTransport {
    /// Start connecting to `endpoint` in the background.
    pub fn spawn(
        endpoint: &SessionEndpoint,
        policy: ReconnectPolicy,
    ) -> (TransportHandle, UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let url = endpoint.connect_url().to_string();
        let log_url = endpoint.redacted_url();
        let task = tokio::spawn(run_connection_loop(
            url,
            log_url,
            policy,
            outbound_rx,
            events_tx,
            shutdown.clone(),
        ));

        (TransportHandle::new(outbound_tx, shutdown), events_rx, task)
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected socket stopped.
enum PumpEnd {
    /// Shutdown requested or the session went away.
    Stopped,
    /// The connection dropped.
    Dropped(String),
}

async fn run_connection_loop(
    url: String,
    log_url: String,
    policy: ReconnectPolicy,
    mut outbound: UnboundedReceiver<ClientMessage>,
    events: UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) {
    let mut failures: u32 = 0;

    loop {
        let mut stale = 0_usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded messages queued while disconnected");
        }

        tracing::info!(url = %log_url, attempt = failures + 1, "Connecting");
        let connected = tokio::select! {
            () = shutdown.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _response)) => {
                failures = 0;
                tracing::info!(url = %log_url, "Connected");
                if events.send(TransportEvent::Opened).is_err() {
                    break;
                }
                match pump(socket, &mut outbound, &events, &shutdown).await {
                    PumpEnd::Stopped => break,
                    PumpEnd::Dropped(reason) => {
                        tracing::warn!(%reason, "Connection dropped");
                        if events.send(TransportEvent::Closed { reason }).is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "Connection attempt failed");
                if events
                    .send(TransportEvent::Closed {
                        reason: e.to_string(),
                    })
                    .is_err()
                {
                    break;
                }
                if policy.exhausted(failures) {
                    tracing::warn!(failures, "Giving up on reconnecting");
                    break;
                }
            }
        }

        tracing::info!(delay_ms = policy.interval.as_millis(), "Reconnecting after delay");
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(policy.interval) => {}
        }
    }

    let _ = events.send(TransportEvent::Finished);
    tracing::info!("Transport finished");
}

async fn pump(
    socket: Socket,
    outbound: &mut UnboundedReceiver<ClientMessage>,
    events: &UnboundedSender<TransportEvent>,
    shutdown: &CancellationToken,
) -> PumpEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return PumpEnd::Stopped;
            }

            message = outbound.recv() => {
                let Some(message) = message else {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpEnd::Stopped;
                };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(kind = message.kind(), error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                tracing::debug!(kind = message.kind(), "Sending");
                if let Err(e) = sink.send(Message::Text(text)).await {
                    return PumpEnd::Dropped(e.to_string());
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match ServerMessage::parse(&text) {
                            Ok(message) => {
                                if events.send(TransportEvent::Message(message)).is_err() {
                                    return PumpEnd::Stopped;
                                }
                            }
                            Err(e) => match e.kind() {
                                Some(kind) => tracing::debug!(kind, "Ignoring unsupported message"),
                                None => tracing::warn!(error = %e, "Ignoring malformed message"),
                            },
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by peer".to_string());
                        return PumpEnd::Dropped(reason);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(bytes = data.len(), "Ignoring binary frame");
                    }
                    // ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpEnd::Dropped(e.to_string()),
                    None => return PumpEnd::Dropped("stream ended".to_string()),
                }
            }
        }
    }
}
