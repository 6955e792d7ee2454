//! # Gateway Socket
//!
//! One WebSocket connection bound to exactly one subscription identifier
//! for its whole life. The socket owns the connect/close lifecycle, the
//! legacy framing (see [`super::framing`]), application-level liveness
//! probes, and auto-reconnection with exponential backoff.
//!
//! State machine: disconnected -> connecting -> open -> closing ->
//! disconnected. A socket never holds more than one live transport; a new
//! `connect()` while one is open is rejected as a caller bug.
//!
//! Decoded events and lifecycle notifications are forwarded to the owning
//! [`super::manager::SocketManager`] over a plain mpsc sender, so the
//! socket never holds an owning reference back to the fleet.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

use super::constants::{
    ABNORMAL_CLOSE_CODE, CLOSE_REASON, ENGINE_IO_VERSION, GATEWAY_URL, PING_FRAME,
    SUCCESS_CLOSE_CODE, TRANSPORT, VIEWING_PROFILE,
};
use super::framing::{self, Frame};
use crate::errors::{DbioError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Lifecycle phase of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Reconnection policy applied after an abnormal close.
///
/// Delays grow exponentially from `base_delay` up to `max_delay`, with a
/// ±25% jitter so a fleet of sockets does not stampede a recovering
/// server. `max_retries: None` retries forever.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectPolicy {
    /// The undithered delay before reconnect attempt `attempt` (1-based).
    fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// The jittered delay before reconnect attempt `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor: f64 = rand::thread_rng().gen_range(0.75..1.25);
        self.base_delay_for(attempt).mul_f64(factor)
    }
}

/// Webhook to notify when the subscribed profile updates.
#[derive(Debug, Clone)]
pub struct WebhookOptions {
    pub id: String,
    pub token: String,
}

/// Per-socket configuration.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Gateway endpoint (scheme + host + path, no query string).
    pub gateway_url: String,
    /// Reconnect automatically on abnormal closure.
    pub auto_reconnect: bool,
    /// How long a connection attempt may take before failing.
    pub connection_timeout: Duration,
    /// How long a liveness probe may stay unanswered. `None` waits forever.
    pub ping_timeout: Option<Duration>,
    /// Backoff policy used by auto-reconnect.
    pub reconnect: ReconnectPolicy,
    /// Optional webhook fired on profile updates.
    pub webhook: Option<WebhookOptions>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            gateway_url: GATEWAY_URL.to_string(),
            auto_reconnect: true,
            connection_timeout: Duration::from_secs(10),
            ping_timeout: Some(Duration::from_secs(10)),
            reconnect: ReconnectPolicy::default(),
            webhook: None,
        }
    }
}

/// Notifications a socket sends to its owning fleet manager.
#[derive(Debug)]
pub(crate) enum SocketSignal {
    /// The transport opened and the subscription was announced.
    Open { id: String },
    /// A decoded `[eventName, eventData]` pair.
    Event { id: String, name: String, data: Value },
    /// The transport closed.
    Close { id: String, code: u16, reason: String },
    /// A transport or protocol error.
    Error { id: String, error: DbioError },
    /// Auto-reconnect exhausted its retry budget.
    ReconnectFailed { id: String },
}

struct PendingPing {
    sent_at: Instant,
    reply: oneshot::Sender<Duration>,
}

struct Shared {
    subscribed_to: String,
    options: SocketOptions,
    state: Mutex<SocketState>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    /// The single in-flight liveness probe slot.
    pending_ping: Mutex<Option<PendingPing>>,
    /// Resolved when the transport confirms a client-initiated close.
    pending_close: Mutex<Option<oneshot::Sender<()>>>,
    /// Set while a close was requested by this side, so the close handler
    /// does not treat the server's confirmation as abnormal.
    client_close: AtomicBool,
    /// Bumped on every successful connect; lets a superseded read loop
    /// detect it no longer owns the socket.
    generation: AtomicU64,
    signals: mpsc::UnboundedSender<SocketSignal>,
}

/// A gateway connection subscribed to one profile identifier.
///
/// Cheap to clone; clones share the same underlying connection.
#[derive(Clone)]
pub struct Socket {
    shared: Arc<Shared>,
}

impl Socket {
    pub(crate) fn new(
        subscribed_to: impl Into<String>,
        options: SocketOptions,
        signals: mpsc::UnboundedSender<SocketSignal>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribed_to: subscribed_to.into(),
                options,
                state: Mutex::new(SocketState::Disconnected),
                writer: tokio::sync::Mutex::new(None),
                pending_ping: Mutex::new(None),
                pending_close: Mutex::new(None),
                client_close: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                signals,
            }),
        }
    }

    /// The identifier this socket is permanently bound to.
    pub fn subscribed_to(&self) -> &str {
        &self.shared.subscribed_to
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SocketState {
        *self.shared.state.lock().expect("socket state lock poisoned")
    }

    pub(crate) fn webhook_options(&self) -> Option<WebhookOptions> {
        self.shared.options.webhook.clone()
    }

    /// Marks the socket as withdrawn by its owner. An in-flight reconnect
    /// loop observes the flag and stops instead of resurrecting the
    /// connection for an identifier nobody owns anymore.
    pub(crate) fn abandon(&self) {
        self.shared.client_close.store(true, Ordering::SeqCst);
    }

    /// Opens the transport, registers the read loop and announces the
    /// subscription. Fails with `InvalidState` when already open.
    pub async fn connect(&self) -> Result<()> {
        self.shared.establish().await
    }

    /// Gracefully closes the connection with the success close code and
    /// resolves once the transport confirms the closure.
    pub async fn close(&self) -> Result<()> {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock().expect("socket state lock poisoned");
            match *state {
                SocketState::Open => *state = SocketState::Closing,
                _ => return Err(DbioError::InvalidState("socket is not open")),
            }
        }
        shared.client_close.store(true, Ordering::SeqCst);
        let rx = {
            let (tx, rx) = oneshot::channel();
            *shared.pending_close.lock().expect("socket close lock poisoned") = Some(tx);
            rx
        };
        {
            let mut writer = shared.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => {
                    sink.send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: CLOSE_REASON.into(),
                    })))
                    .await?
                }
                None => return Err(DbioError::InvalidState("socket is not open")),
            }
        }
        // Resolved by the read loop once the server echoes the close.
        let _ = rx.await;
        Ok(())
    }

    /// Sends an application-level liveness probe and resolves with the
    /// round-trip time once the matching pong frame arrives.
    ///
    /// Only one probe may be in flight; a second `ping()` before the first
    /// resolves fails with `InvalidState`. When a ping timeout is
    /// configured, an unanswered probe releases the slot and fails with
    /// `Timeout` so a later probe can be issued.
    pub async fn ping(&self) -> Result<Duration> {
        let shared = &self.shared;
        let rx = {
            let mut slot = shared.pending_ping.lock().expect("socket ping lock poisoned");
            if slot.is_some() {
                return Err(DbioError::InvalidState("a ping is already in flight"));
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(PendingPing {
                sent_at: Instant::now(),
                reply: tx,
            });
            rx
        };
        if let Err(e) = shared.send_text(PING_FRAME.to_string()).await {
            *shared.pending_ping.lock().expect("socket ping lock poisoned") = None;
            return Err(e);
        }
        let wait = async {
            rx.await
                .map_err(|_| DbioError::Transport(tungstenite::Error::ConnectionClosed))
        };
        match shared.options.ping_timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    *shared.pending_ping.lock().expect("socket ping lock poisoned") = None;
                    Err(DbioError::Timeout(limit))
                }
            },
            None => wait.await,
        }
    }
}

impl Shared {
    /// Boxed so the connect -> read loop -> reconnect -> connect cycle
    /// does not form an infinitely recursive future type.
    fn establish<'a>(
        self: &'a Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.establish_inner())
    }

    async fn establish_inner(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().expect("socket state lock poisoned");
            match *state {
                SocketState::Disconnected => *state = SocketState::Connecting,
                _ => return Err(DbioError::InvalidState("socket is already connected")),
            }
        }
        match self.open_transport().await {
            Ok((sink, source)) => {
                *self.writer.lock().await = Some(sink);
                *self.state.lock().expect("socket state lock poisoned") = SocketState::Open;
                self.client_close.store(false, Ordering::SeqCst);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

                // Announce which profile this socket is viewing so the
                // server starts streaming events for it.
                let announce = framing::encode_event(
                    VIEWING_PROFILE,
                    &Value::String(self.subscribed_to.clone()),
                );
                if let Err(e) = self.send_text(announce).await {
                    *self.state.lock().expect("socket state lock poisoned") =
                        SocketState::Disconnected;
                    *self.writer.lock().await = None;
                    return Err(e);
                }

                let me = Arc::clone(self);
                tokio::spawn(async move { me.read_loop(source, generation).await });

                let _ = self.signals.send(SocketSignal::Open {
                    id: self.subscribed_to.clone(),
                });
                log::info!("socket {}: connected", self.subscribed_to);
                Ok(())
            }
            Err(e) => {
                *self.state.lock().expect("socket state lock poisoned") =
                    SocketState::Disconnected;
                Err(e)
            }
        }
    }

    /// Performs the WebSocket handshake against the gateway with the fixed
    /// query-string handshake and upgrade headers. Compression stays off
    /// (tungstenite negotiates none by default).
    async fn open_transport(&self) -> Result<(WsSink, WsSource)> {
        let url = format!(
            "{}/?EIO={}&transport={}",
            self.options.gateway_url.trim_end_matches('/'),
            ENGINE_IO_VERSION,
            TRANSPORT
        );
        let uri: http::Uri = url
            .parse()
            .map_err(|e| DbioError::Protocol(format!("invalid gateway URL {url}: {e}")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| DbioError::Protocol(format!("gateway URL {url} has no host")))?
            .to_string();
        let request = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("Host", authority)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| DbioError::Protocol(format!("failed to build handshake: {e}")))?;

        log::debug!("socket {}: connecting to {url}", self.subscribed_to);
        let (stream, _response) =
            tokio::time::timeout(self.options.connection_timeout, connect_async(request))
                .await
                .map_err(|_| DbioError::Timeout(self.options.connection_timeout))??;
        Ok(stream.split())
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => {
                sink.send(WsMessage::Text(text.into())).await?;
                Ok(())
            }
            None => Err(DbioError::InvalidState("socket is not open")),
        }
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, generation: u64) {
        let mut close_code = ABNORMAL_CLOSE_CODE;
        let mut close_reason = String::new();
        while let Some(message) = source.next().await {
            match message {
                Ok(WsMessage::Text(text)) => self.handle_frame(text.as_str()),
                Ok(WsMessage::Close(frame)) => {
                    if let Some(frame) = frame {
                        close_code = frame.code.into();
                        close_reason = frame.reason.to_string();
                    }
                    break;
                }
                Ok(WsMessage::Binary(_)) => {
                    // The wire protocol is text-only; surface the mismatch
                    // but keep the connection going.
                    self.report_error(DbioError::Protocol(
                        "non-text frame received from gateway".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => break,
                Err(e) => {
                    // tungstenite finishes a close handshake we initiated
                    // internally, so the teardown can surface here as a
                    // transport error instead of a Close message.
                    if !self.client_close.load(Ordering::SeqCst) {
                        self.report_error(DbioError::Transport(e));
                    }
                    break;
                }
            }
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            // A newer connection took over; this loop is stale.
            return;
        }
        if self.client_close.load(Ordering::SeqCst) && close_code == ABNORMAL_CLOSE_CODE {
            // We sent the close frame ourselves; the missing echo does not
            // make the closure abnormal.
            close_code = SUCCESS_CLOSE_CODE;
            close_reason = CLOSE_REASON.to_string();
        }
        self.handle_close(close_code, close_reason).await;
    }

    fn handle_frame(&self, text: &str) {
        match framing::parse_frame(text) {
            Ok(Frame::Pong) => {
                if let Some(pending) = self
                    .pending_ping
                    .lock()
                    .expect("socket ping lock poisoned")
                    .take()
                {
                    let _ = pending.reply.send(pending.sent_at.elapsed());
                }
            }
            Ok(Frame::Event(name, data)) => {
                let _ = self.signals.send(SocketSignal::Event {
                    id: self.subscribed_to.clone(),
                    name,
                    data,
                });
            }
            Ok(Frame::Control) | Ok(Frame::Other(_)) => {
                log::trace!("socket {}: ignoring non-event frame", self.subscribed_to);
            }
            Err(e) => self.report_error(e),
        }
    }

    /// Errors are forwarded to the fleet bus and always logged, so a bus
    /// nobody listens to never hides a failure.
    fn report_error(&self, error: DbioError) {
        log::error!("socket {}: {error}", self.subscribed_to);
        let _ = self.signals.send(SocketSignal::Error {
            id: self.subscribed_to.clone(),
            error,
        });
    }

    async fn handle_close(self: &Arc<Self>, code: u16, reason: String) {
        log::info!(
            "socket {}: closed (code {code}): {reason}",
            self.subscribed_to
        );
        *self.state.lock().expect("socket state lock poisoned") = SocketState::Disconnected;
        *self.writer.lock().await = None;
        // Dropping the slot fails any probe still waiting for its pong.
        *self.pending_ping.lock().expect("socket ping lock poisoned") = None;
        if let Some(tx) = self
            .pending_close
            .lock()
            .expect("socket close lock poisoned")
            .take()
        {
            let _ = tx.send(());
        }
        let _ = self.signals.send(SocketSignal::Close {
            id: self.subscribed_to.clone(),
            code,
            reason,
        });
        let client_close = self.client_close.load(Ordering::SeqCst);
        if self.options.auto_reconnect && code != SUCCESS_CLOSE_CODE && !client_close {
            self.reconnect().await;
        }
    }

    async fn reconnect(self: &Arc<Self>) {
        let policy = self.options.reconnect.clone();
        let mut attempt: u32 = 0;
        loop {
            if self.client_close.load(Ordering::SeqCst) {
                log::debug!("socket {}: reconnect cancelled", self.subscribed_to);
                return;
            }
            attempt += 1;
            if let Some(max) = policy.max_retries {
                if attempt > max {
                    log::error!(
                        "socket {}: giving up after {max} reconnect attempts",
                        self.subscribed_to
                    );
                    let _ = self.signals.send(SocketSignal::ReconnectFailed {
                        id: self.subscribed_to.clone(),
                    });
                    return;
                }
            }
            let delay = policy.delay_for(attempt);
            log::warn!(
                "socket {}: reconnecting in {delay:?} (attempt {attempt})",
                self.subscribed_to
            );
            tokio::time::sleep(delay).await;
            if self.client_close.load(Ordering::SeqCst) {
                log::debug!("socket {}: reconnect cancelled", self.subscribed_to);
                return;
            }
            match self.establish().await {
                Ok(()) => return,
                Err(e) => log::warn!(
                    "socket {}: reconnect attempt {attempt} failed: {e}",
                    self.subscribed_to
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_up_to_the_cap() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        };
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.base_delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.base_delay_for(60), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_base() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..6 {
            let base = policy.base_delay_for(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= base.mul_f64(0.75));
            assert!(jittered <= base.mul_f64(1.25));
        }
    }
}
