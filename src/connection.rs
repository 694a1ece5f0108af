//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns one logical WebSocket session: endpoint,
//! optional initial message, reconnect policy, live status, and the
//! append-only message log. All mutation happens on a single driver task;
//! handles are cheap clones that issue commands over a channel and observe
//! [`ConnectionState`] snapshots through a watch channel, so socket events
//! and caller operations can never race on counters or log ordering.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use backoff::backoff::{Backoff as _, Constant};
use chrono::{DateTime, Utc};
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use crate::Result;
use crate::close::{ABNORMAL_CLOSURE, NO_STATUS, NORMAL_CLOSURE, close_reason};
use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::log::{LogEntry, MessageLog};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = Pin<Box<dyn Future<Output = tungstenite::Result<WsStream>> + Send>>;

/// Session status. Transitions are strictly sequential:
/// `Idle → Connecting → Open → Closed → (Reconnecting → Connecting)`, with
/// `disconnect` forcing `Closed` from anywhere.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    /// No connection has been attempted yet.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Socket is live.
    Open,
    /// Socket has gone away and no reconnect is pending.
    Closed,
    /// Waiting out the reconnect delay after a non-normal close.
    Reconnecting,
}

impl Status {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether `connect` is allowed from this status.
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

/// Snapshot of everything a UI needs to render a session.
///
/// `message_count` tracks **received** frames only; sent traffic appears in
/// the log but does not move the counter. That asymmetry is inherited
/// behavior and kept deliberately.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionState {
    pub status: Status,
    /// Set on the transition to [`Status::Open`], cleared on close.
    pub opened_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub log: MessageLog,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            opened_at: None,
            last_message_at: None,
            message_count: 0,
            error_count: 0,
            last_error: None,
            log: MessageLog::default(),
        }
    }
}

enum Command {
    Connect(Box<ConnectionConfig>),
    Disconnect,
    Send(String),
    ClearLog,
    ResetCounters,
}

/// Handle to one logical WebSocket session.
///
/// Cloning shares the session. Dropping every handle tears the session down:
/// the driver closes any live socket, cancels any pending reconnect, and no
/// further events fire.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        tokio::spawn(async move {
            Driver::new(state_tx, cmd_rx).run().await;
        });

        Self { cmd_tx, state_rx }
    }

    /// Start connecting with the given config.
    ///
    /// Validates the URL and the advisory header JSON synchronously, before
    /// any network activity; returns immediately on success and the caller
    /// observes the Connecting/Open transitions via [`subscribe`].
    ///
    /// Fails if the session is already connecting or open.
    ///
    /// [`subscribe`]: ConnectionManager::subscribe
    pub fn connect(&self, config: ConnectionConfig) -> Result<()> {
        let status = self.state_rx.borrow().status;
        if !status.can_connect() {
            return Err(Error::validation(format!(
                "connect requires an idle or closed session (session is {status})"
            )));
        }
        config.validate()?;

        self.dispatch(Command::Connect(Box::new(config)));
        Ok(())
    }

    /// Close the session with code 1000 and cancel any pending reconnect.
    /// Valid from any state; a no-op when already idle or closed.
    pub fn disconnect(&self) {
        self.dispatch(Command::Disconnect);
    }

    /// Transmit a payload over the open socket.
    ///
    /// When the session is not open nothing is transmitted; the rejection is
    /// reported both as the returned error and as a single system log entry.
    ///
    /// The returned `Result` reflects the status snapshot at call time, so
    /// `Ok` is best-effort: a close racing this call means the driver drops
    /// the payload and records the rejection. The session log is the
    /// authoritative record of what reached the wire.
    pub fn send<P: Into<String>>(&self, payload: P) -> Result<()> {
        let status = self.state_rx.borrow().status;
        // The driver re-checks and records the rejection either way.
        self.dispatch(Command::Send(payload.into()));

        if status.is_open() {
            Ok(())
        } else {
            Err(Error::not_connected(status))
        }
    }

    /// Truncate the log to empty. Status, counters, and the live connection
    /// are unaffected.
    pub fn clear_log(&self) {
        self.dispatch(Command::ClearLog);
    }

    /// Zero `message_count`/`error_count` and clear `last_error`. The log is
    /// unaffected.
    pub fn reset_counters(&self) {
        self.dispatch(Command::ResetCounters);
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state snapshots. Each receiver independently observes the
    /// latest [`ConnectionState`] after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Newline-joined `[HH:MM:SS] <payload>` render of the current log, for
    /// copy-to-clipboard use.
    #[must_use]
    pub fn export_log(&self) -> String {
        self.state_rx.borrow().log.export()
    }

    fn dispatch(&self, command: Command) {
        // The driver only goes away when every handle is dropped, so a send
        // failure here is unreachable from safe callers.
        _ = self.cmd_tx.send(command);
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The single task that owns all session state and the underlying socket.
struct Driver {
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state: ConnectionState,
    config: Option<ConnectionConfig>,
    /// Fixed-delay retry policy, rebuilt per `connect`.
    policy: Option<Constant>,
    pending_connect: Option<ConnectFuture>,
    socket: Option<WsStream>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    fn new(
        state_tx: watch::Sender<ConnectionState>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            state_tx,
            cmd_rx,
            state: ConnectionState::default(),
            config: None,
            policy: None,
            pending_connect: None,
            socket: None,
            reconnect_timer: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(command) => self.handle_command(command).await,
                        // Every handle dropped: tear down without delivering
                        // any further event.
                        None => break,
                    }
                }
                connected = poll_connect(&mut self.pending_connect),
                    if self.pending_connect.is_some() =>
                {
                    self.pending_connect = None;
                    self.handle_connect_result(connected).await;
                }
                frame = next_frame(&mut self.socket), if self.socket.is_some() => {
                    self.handle_frame(frame);
                }
                () = poll_sleep(&mut self.reconnect_timer),
                    if self.reconnect_timer.is_some() =>
                {
                    self.reconnect_timer = None;
                    self.begin_connect();
                }
            }
        }

        if let Some(mut socket) = self.socket.take() {
            _ = socket.close(None).await;
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(config) => {
                if !self.state.status.can_connect() {
                    // The handle rejects this up front; only a stale status
                    // snapshot can race a command through.
                    self.push_system(format!(
                        "connect ignored: session is {}",
                        self.state.status
                    ));
                    self.publish();
                    return;
                }
                self.policy = Some(Constant::new(config.reconnect_delay));
                self.config = Some(*config);
                self.begin_connect();
            }
            Command::Disconnect => self.disconnect().await,
            Command::Send(payload) => self.send_payload(payload).await,
            Command::ClearLog => {
                self.state.log.clear();
                self.publish();
            }
            Command::ResetCounters => {
                self.state.message_count = 0;
                self.state.error_count = 0;
                self.state.last_error = None;
                self.publish();
            }
        }
    }

    /// Kick off a handshake for the stored config. Used by both `connect`
    /// and the reconnect timer; counters and log carry over untouched.
    fn begin_connect(&mut self) {
        let Some(config) = self.config.as_ref() else {
            return;
        };
        let url = config.url.clone();

        self.state.status = Status::Connecting;
        self.push_system(format!("connecting to {url}"));
        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "starting websocket handshake");

        self.pending_connect = Some(Box::pin(async move {
            connect_async(url).await.map(|(stream, _response)| stream)
        }));
        self.publish();
    }

    async fn handle_connect_result(&mut self, result: tungstenite::Result<WsStream>) {
        match result {
            Ok(stream) => {
                self.socket = Some(stream);
                self.state.status = Status::Open;
                self.state.opened_at = Some(Utc::now());

                let url = self
                    .config
                    .as_ref()
                    .map(|config| config.url.clone())
                    .unwrap_or_default();
                self.push_system(format!("connected to {url}"));
                #[cfg(feature = "tracing")]
                tracing::info!(%url, "websocket connected");

                let initial = self
                    .config
                    .as_ref()
                    .and_then(|config| config.initial_message.clone());
                if let Some(message) = initial
                    && !message.trim().is_empty()
                {
                    self.transmit(message).await;
                }
                self.publish();
            }
            Err(e) => {
                // A failed handshake never delivers a close frame; record the
                // error and drive the same close path a browser would (1006).
                self.record_error(&e);
                self.handle_close(ABNORMAL_CLOSURE);
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<tungstenite::Result<Message>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.record_received(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.record_received(&text);
            }
            Some(Ok(Message::Close(close))) => {
                let code = close.map_or(NO_STATUS, |frame| u16::from(frame.code));
                self.socket = None;
                self.handle_close(code);
            }
            // Ping/pong are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                self.record_error(&e);
                self.socket = None;
                self.handle_close(ABNORMAL_CLOSURE);
            }
            None => {
                // Stream ended without a close handshake.
                self.socket = None;
                self.handle_close(ABNORMAL_CLOSURE);
            }
        }
    }

    /// Record a close, then schedule a reconnect when the policy calls for
    /// one. Reconnects preserve counters and log.
    fn handle_close(&mut self, code: u16) {
        self.state.status = Status::Closed;
        self.state.opened_at = None;
        self.push_system(format!(
            "connection closed (code {code}: {})",
            close_reason(code)
        ));
        #[cfg(feature = "tracing")]
        tracing::info!(code, reason = close_reason(code), "websocket closed");

        let auto_reconnect = self
            .config
            .as_ref()
            .is_some_and(|config| config.auto_reconnect);
        if auto_reconnect
            && code != NORMAL_CLOSURE
            && let Some(delay) = self.policy.as_mut().and_then(Constant::next_backoff)
        {
            self.state.status = Status::Reconnecting;
            self.push_system("attempting reconnect");
            self.reconnect_timer = Some(Box::pin(sleep(delay)));
        }
        self.publish();
    }

    async fn disconnect(&mut self) {
        self.reconnect_timer = None;
        // Abandoning an in-flight handshake drops its TCP stream.
        self.pending_connect = None;

        if let Some(mut socket) = self.socket.take() {
            _ = socket
                .close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "user disconnect".into(),
                }))
                .await;
        }

        match self.state.status {
            // Idempotent: disconnecting an idle or closed session is a no-op.
            Status::Idle | Status::Closed => {}
            _ => {
                self.state.status = Status::Closed;
                self.state.opened_at = None;
                self.push_system(format!(
                    "disconnected (code {NORMAL_CLOSURE}: {})",
                    close_reason(NORMAL_CLOSURE)
                ));
                self.publish();
            }
        }
    }

    async fn send_payload(&mut self, payload: String) {
        if !self.state.status.is_open() {
            self.push_system(format!(
                "send rejected: session is {} (payload not transmitted)",
                self.state.status
            ));
            self.publish();
            return;
        }
        if payload.trim().is_empty() {
            self.push_system("send skipped: empty payload");
            self.publish();
            return;
        }
        self.transmit(payload).await;
        self.publish();
    }

    /// Transmit the full payload; the log keeps a display-truncated copy.
    async fn transmit(&mut self, payload: String) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        match socket.send(Message::Text(payload.clone().into())).await {
            Ok(()) => {
                self.state.log.push(LogEntry::sent(&payload));
                #[cfg(feature = "tracing")]
                tracing::trace!(bytes = payload.len(), "transmitted payload");
            }
            Err(e) => self.record_error(&e),
        }
    }

    fn record_received(&mut self, raw: &str) {
        self.state.log.push(LogEntry::received(raw));
        self.state.message_count += 1;
        self.state.last_message_at = Some(Utc::now());
        #[cfg(feature = "tracing")]
        tracing::trace!(bytes = raw.len(), "received frame");
        self.publish();
    }

    /// Record a transport error. Status is left alone; the close event that
    /// follows drives the state transition.
    fn record_error(&mut self, error: &dyn fmt::Display) {
        let description = error.to_string();
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %description, "websocket transport error");
        self.state.error_count += 1;
        self.state.last_error = Some(description.clone());
        self.state.log.push(LogEntry::system(format!(
            "transport error: {description}"
        )));
        self.publish();
    }

    fn push_system<S: Into<String>>(&mut self, note: S) {
        self.state.log.push(LogEntry::system(note));
    }

    fn publish(&self) {
        _ = self.state_tx.send(self.state.clone());
    }
}

async fn poll_connect(slot: &mut Option<ConnectFuture>) -> tungstenite::Result<WsStream> {
    match slot.as_mut() {
        Some(fut) => fut.as_mut().await,
        // Branch is guarded on `is_some`; never polled otherwise.
        None => std::future::pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<tungstenite::Result<Message>> {
    match socket.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn poll_sleep(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot.as_mut() {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::error::Kind;
    use crate::log::Direction;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn status_renders_lowercase() {
        assert_eq!(Status::Open.to_string(), "open");
        assert_eq!(Status::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn connect_is_only_allowed_from_idle_or_closed() {
        assert!(Status::Idle.can_connect());
        assert!(Status::Closed.can_connect());
        assert!(!Status::Connecting.can_connect());
        assert!(!Status::Open.can_connect());
        assert!(!Status::Reconnecting.can_connect());
    }

    #[tokio::test]
    async fn connect_rejects_invalid_urls_without_touching_state() {
        let manager = ConnectionManager::new();

        for raw in ["", "not a url", "http://example.test/ws"] {
            let error = manager
                .connect(ConnectionConfig::new(raw))
                .expect_err("invalid url must fail");
            assert_eq!(error.kind(), Kind::InvalidUrl, "url: {raw}");
        }

        let state = manager.state();
        assert_eq!(state.status, Status::Idle);
        assert!(state.log.is_empty(), "no connection attempt may be logged");
    }

    #[tokio::test]
    async fn connect_rejects_malformed_headers_before_dialing() {
        let manager = ConnectionManager::new();
        let config = ConnectionConfig::new("ws://example.test/ws").with_headers("{oops");

        let error = manager.connect(config).expect_err("headers must fail");
        assert_eq!(error.kind(), Kind::InvalidPayload);
        assert_eq!(manager.state().status, Status::Idle);
    }

    #[tokio::test]
    async fn send_while_idle_fails_and_logs_exactly_one_rejection() {
        let manager = ConnectionManager::new();

        let error = manager.send("hello").expect_err("session is idle");
        assert_eq!(error.kind(), Kind::NotConnected);

        let mut updates = manager.subscribe();
        let state = timeout(WAIT, updates.wait_for(|state| !state.log.is_empty()))
            .await
            .expect("driver must record the rejection")
            .expect("driver alive")
            .clone();

        let rejections: Vec<_> = state
            .log
            .entries()
            .iter()
            .filter(|entry| entry.direction == Direction::System)
            .collect();
        assert_eq!(rejections.len(), 1);
        assert!(rejections[0].payload.contains("send rejected"));
        // Nothing was transmitted, so the session is untouched otherwise.
        assert_eq!(state.status, Status::Idle);
        assert_eq!(state.message_count, 0);
    }

    #[tokio::test]
    async fn clear_log_leaves_counters_alone() {
        let manager = ConnectionManager::new();
        let mut updates = manager.subscribe();

        _ = manager.send("ignored");
        _ = timeout(WAIT, updates.wait_for(|state| !state.log.is_empty()))
            .await
            .expect("rejection logged");

        manager.clear_log();
        let state = timeout(WAIT, updates.wait_for(|state| state.log.is_empty()))
            .await
            .expect("log cleared")
            .expect("driver alive")
            .clone();

        assert_eq!(state.message_count, 0);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.status, Status::Idle);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let manager = ConnectionManager::new();

        manager.disconnect();
        manager.disconnect();

        // Give the driver a beat to process both commands.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = manager.state();
        assert_eq!(state.status, Status::Idle);
        assert!(state.log.is_empty());
    }

    #[tokio::test]
    async fn export_log_renders_console_lines() {
        let manager = ConnectionManager::new();
        let mut updates = manager.subscribe();

        _ = manager.send("ignored");
        _ = timeout(WAIT, updates.wait_for(|state| !state.log.is_empty()))
            .await
            .expect("rejection logged");

        let exported = manager.export_log();
        assert!(exported.starts_with('['), "got {exported}");
        assert!(exported.contains("] send rejected"), "got {exported}");
    }
}
