/// Reconnecting live channel, bound to exactly one conversation
///
/// A supervisor task owns the WebSocket for its whole lifecycle: it dials,
/// drives the open connection, and schedules bounded retries on abnormal
/// closure. `send` never needs a prior `connect` — it kicks the supervisor
/// and waits (bounded) for the link to open, resolving to a plain bool.
use crate::config::Config;
use crate::protocol::{MessageCreate, ServerMessage};
use crate::session::SessionContext;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Connection state of the live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never asked to connect
    Idle,
    /// Dialing or between retry attempts
    Connecting,
    /// Link established
    Open,
    /// Gave up (reconnect budget exhausted or server closed normally);
    /// a later send or connect starts a fresh attempt cycle
    Down,
    /// Manually disconnected; permanent for this handle
    Closed,
}

struct Outbound {
    text: String,
    ack: oneshot::Sender<bool>,
}

/// Why an established connection ended
enum LinkDrop {
    Normal,
    Abnormal,
    Shutdown,
    ConsumerGone,
}

pub struct ChannelTransport {
    reconnect_interval: Duration,
    max_reconnect_attempts: u32,
    send_timeout: Duration,
    out_tx: mpsc::Sender<Outbound>,
    state_rx: watch::Receiver<LinkState>,
    kick: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChannelTransport {
    /// Open a transport for one conversation. Returns the handle and the
    /// receiver of parsed inbound messages, in delivery order.
    pub fn open(
        session: &SessionContext,
        chat_id: &str,
        config: &Config,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::open_endpoint(session.ws_endpoint(chat_id), config)
    }

    /// Open against a raw endpoint (used directly by tests)
    pub fn open_endpoint(
        endpoint: String,
        config: &Config,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (msg_tx, msg_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let kick = Arc::new(Notify::new());

        tokio::spawn(supervise(
            endpoint,
            config.reconnect_interval,
            config.max_reconnect_attempts,
            msg_tx,
            out_rx,
            state_tx,
            kick.clone(),
            shutdown_rx,
        ));

        (
            Self {
                reconnect_interval: config.reconnect_interval,
                max_reconnect_attempts: config.max_reconnect_attempts,
                send_timeout: config.send_timeout,
                out_tx,
                state_rx,
                kick,
                shutdown_tx,
            },
            msg_rx,
        )
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Ask the supervisor to bring the link up. Idempotent; refused after a
    /// manual disconnect.
    pub fn connect(&self) {
        if *self.shutdown_tx.borrow() {
            return;
        }
        self.kick.notify_one();
    }

    /// Serialize and deliver one client payload. Triggers a connect attempt
    /// if the link is not open and waits (bounded) for it; resolves to
    /// false on timeout, exhausted reconnect budget, or delivery failure.
    pub async fn send(&self, message: &MessageCreate) -> bool {
        let Ok(text) = message.to_json() else {
            return false;
        };
        self.send_text(text).await
    }

    async fn send_text(&self, text: String) -> bool {
        if *self.shutdown_tx.borrow() {
            return false;
        }
        self.kick.notify_one();

        if !self.wait_open().await {
            warn!("Send gave up: link did not open within {:?}", self.send_timeout);
            return false;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .out_tx
            .send(Outbound {
                text,
                ack: ack_tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        matches!(timeout(self.send_timeout, ack_rx).await, Ok(Ok(true)))
    }

    async fn wait_open(&self) -> bool {
        let mut state_rx = self.state_rx.clone();
        if *state_rx.borrow() == LinkState::Open {
            return true;
        }
        // The current value may be a stale Down from before our kick; only
        // transitions observed from here on are meaningful.
        timeout(self.send_timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return false;
                }
                match *state_rx.borrow() {
                    LinkState::Open => return true,
                    LinkState::Down | LinkState::Closed => return false,
                    LinkState::Idle | LinkState::Connecting => {}
                }
            }
        })
        .await
        .unwrap_or(false)
    }

    /// Tear the link down and permanently disable auto-reconnect for this
    /// handle. A late-arriving close event schedules nothing.
    pub fn disconnect(&self) {
        debug!("Live channel disconnect requested");
        let _ = self.shutdown_tx.send(true);
        self.kick.notify_one();
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }
}

async fn supervise(
    endpoint: String,
    reconnect_interval: Duration,
    max_attempts: u32,
    msg_tx: mpsc::Sender<ServerMessage>,
    mut out_rx: mpsc::Receiver<Outbound>,
    state_tx: watch::Sender<LinkState>,
    kick: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    'idle: loop {
        // Park until someone wants the link up. A closed shutdown channel
        // means the handle is gone: same as a manual disconnect.
        tokio::select! {
            _ = kick.notified() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break 'idle;
                }
            }
        }
        if *shutdown_rx.borrow() {
            break 'idle;
        }

        let mut attempts: u32 = 0;
        loop {
            if *shutdown_rx.borrow() {
                break 'idle;
            }
            let _ = state_tx.send(LinkState::Connecting);

            match connect_async(endpoint.as_str()).await {
                Ok((ws, _)) => {
                    attempts = 0;
                    info!("Live channel open");
                    let _ = state_tx.send(LinkState::Open);

                    match drive(ws, &msg_tx, &mut out_rx, &mut shutdown_rx).await {
                        LinkDrop::Shutdown | LinkDrop::ConsumerGone => break 'idle,
                        LinkDrop::Normal => {
                            info!("Live channel closed by server");
                            let _ = state_tx.send(LinkState::Down);
                            continue 'idle;
                        }
                        LinkDrop::Abnormal => {
                            warn!("Live channel dropped abnormally");
                        }
                    }
                }
                Err(e) => {
                    warn!("Connect failed: {}", e);
                }
            }

            attempts += 1;
            if attempts >= max_attempts {
                warn!(
                    "Reconnect budget exhausted after {} attempts, link is down",
                    attempts
                );
                let _ = state_tx.send(LinkState::Down);
                continue 'idle;
            }

            tokio::select! {
                _ = sleep(reconnect_interval) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break 'idle;
                    }
                }
            }
        }
    }

    let _ = state_tx.send(LinkState::Closed);
}

/// Drive one established connection until it drops
async fn drive(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    msg_tx: &mpsc::Sender<ServerMessage>,
    out_rx: &mut mpsc::Receiver<Outbound>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LinkDrop {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    match ServerMessage::parse(&text) {
                        Ok(msg) => {
                            debug!("Live message: {}", msg.message_type());
                            if msg_tx.send(msg).await.is_err() {
                                return LinkDrop::ConsumerGone;
                            }
                        }
                        // Malformed payload: drop it, keep the link alive
                        Err(e) => warn!("Dropping malformed live payload: {}", e),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let normal = matches!(
                        frame.as_ref().map(|f| f.code),
                        Some(CloseCode::Normal) | Some(CloseCode::Away)
                    );
                    debug!("Close frame received (normal: {})", normal);
                    return if normal { LinkDrop::Normal } else { LinkDrop::Abnormal };
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by the protocol layer; binary ignored
                }
                Some(Err(e)) => {
                    warn!("Live channel error: {}", e);
                    return LinkDrop::Abnormal;
                }
                None => return LinkDrop::Abnormal,
            },
            outbound = out_rx.recv() => match outbound {
                Some(Outbound { text, ack }) => {
                    let delivered = sink.send(WsMessage::Text(text)).await.is_ok();
                    let _ = ack.send(delivered);
                    if !delivered {
                        return LinkDrop::Abnormal;
                    }
                }
                None => return LinkDrop::ConsumerGone,
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return LinkDrop::Shutdown;
                }
            }
        }
    }
}
