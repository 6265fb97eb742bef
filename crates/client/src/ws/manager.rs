//! Transport connection manager: one realtime session per signed-in user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use luci_shared::{
    client_events, EnginePacket, SocketPacket, TransportError, CHAT_NAMESPACE,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::connection::{ConnectionState, ReconnectConfig, TransportKind};
use super::link::{self, Link};
use crate::config::ClientConfig;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked with the first argument of a pushed event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Commands from the manager to the connection task
#[derive(Debug)]
pub(crate) enum Outbound {
    Emit(SocketPacket),
    Disconnect,
}

/// The live (or reconnecting) session of one user
struct ActiveSession {
    user_id: String,
    /// Distinguishes this session's task from torn-down ones
    generation: u64,
    sender: UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(true)
    }

    /// Ask the task to say goodbye, then stop it.
    fn retire(self) {
        tracing::info!(user_id = %self.user_id, "closing realtime session");
        let _ = self.sender.unbounded_send(Outbound::Disconnect);
        self.sender.close_channel();
        if let Some(task) = self.task {
            // Give the task a moment to send the goodbye packets
            tokio::spawn(async move {
                let abort = task.abort_handle();
                if tokio::time::timeout(std::time::Duration::from_millis(500), task)
                    .await
                    .is_err()
                {
                    abort.abort();
                }
            });
        }
    }
}

struct Inner {
    socket_url: String,
    reconnect: ReconnectConfig,
    transports: Vec<TransportKind>,
    http: reqwest::Client,
    state: watch::Sender<ConnectionState>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventHandler)>>>,
    /// Every state change happens under this lock, so a torn-down task can
    /// never publish over the session that replaced it.
    session: Mutex<Option<ActiveSession>>,
    next_listener: AtomicU64,
    next_generation: AtomicU64,
}

fn is_current(session: &Option<ActiveSession>, generation: u64) -> bool {
    session.as_ref().map(|s| s.generation) == Some(generation)
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Publish `state` on behalf of the task of `generation`. False once
    /// that session was disconnected or replaced.
    fn set_state_if_current(&self, generation: u64, state: ConnectionState) -> bool {
        let session = self.session.lock();
        if !is_current(&session, generation) {
            return false;
        }
        self.set_state(state);
        true
    }

    /// Announce presence and go `Connected` in one step. `Ok(false)` if the
    /// session is no longer the current one; nothing is sent then.
    fn go_live(&self, generation: u64, link: &Link, user_id: &str) -> Result<bool, TransportError> {
        let session = self.session.lock();
        if !is_current(&session, generation) {
            return Ok(false);
        }
        let hello = SocketPacket::event(
            CHAT_NAMESPACE,
            client_events::USER_CONNECTED,
            Value::String(user_id.to_string()),
        );
        link.send(EnginePacket::Message(hello.encode()))?;
        self.set_state(ConnectionState::Connected);
        Ok(true)
    }

    /// Invoke every handler registered for `event`.
    ///
    /// Handlers are snapshotted under the lock and called outside it, so a
    /// handler may register or remove listeners without dropping this event.
    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .get(event)
            .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::debug!(event, "no listener for pushed event");
            return;
        }
        for handler in handlers {
            handler(payload);
        }
    }
}

/// Owns the single realtime connection of a session and lends it to the
/// booking router and chat sessions through `on` / `emit`.
///
/// Cloning is cheap; all clones share one connection.
#[derive(Clone)]
pub struct TransportManager {
    inner: Arc<Inner>,
}

impl TransportManager {
    pub fn new(
        socket_url: impl Into<String>,
        reconnect: ReconnectConfig,
        transports: Vec<TransportKind>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                socket_url: socket_url.into(),
                reconnect,
                transports,
                http: reqwest::Client::new(),
                state,
                listeners: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                next_listener: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.socket_url.clone(),
            config.reconnect.clone(),
            config.transports.clone(),
        )
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// User of the current session, if any.
    pub fn user_id(&self) -> Option<String> {
        self.inner.session.lock().as_ref().map(|s| s.user_id.clone())
    }

    /// Open the realtime session for `user_id`.
    ///
    /// A no-op while a session for the same user is live or reconnecting.
    /// A session for another user is fully torn down first, listeners
    /// included. Must be called from within a tokio runtime.
    pub fn connect(&self, user_id: &str) {
        let mut session = self.inner.session.lock();
        if let Some(active) = session.as_ref() {
            if active.user_id == user_id && active.is_running() {
                tracing::debug!(user_id, "realtime session already active");
                return;
            }
        }
        if let Some(previous) = session.take() {
            if previous.user_id != user_id {
                self.inner.listeners.lock().clear();
            }
            previous.retire();
        }

        let url = match Url::parse(&self.inner.socket_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("invalid socket url {}: {}", self.inner.socket_url, e);
                self.inner.set_state(ConnectionState::Failed {
                    reason: format!("invalid socket url: {}", e),
                });
                return;
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        // The task blocks on the session lock until the session below is installed
        let task = tokio::spawn(run_connection_loop(
            self.inner.clone(),
            url,
            user_id.to_string(),
            generation,
            receiver,
        ));

        *session = Some(ActiveSession {
            user_id: user_id.to_string(),
            generation,
            sender,
            task: Some(task),
        });
        self.inner.set_state(ConnectionState::Connecting);
    }

    /// Tear down the connection and drop every listener. Used on logout.
    pub fn disconnect(&self) {
        let mut session = self.inner.session.lock();
        if let Some(previous) = session.take() {
            previous.retire();
        }
        self.inner.listeners.lock().clear();
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Register a handler for a server-pushed event.
    ///
    /// Registrations are additive: calling `on` twice for the same event
    /// yields two listeners and both run. Callers that re-register must first
    /// remove their previous [`ListenerId`].
    pub fn on(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove every listener for `event`.
    pub fn off(&self, event: &str) {
        self.inner.listeners.lock().remove(event);
    }

    /// Remove one listener. Returns false if it was already gone.
    pub fn off_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let mut removed = false;
        listeners.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(lid, _)| *lid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Emit an event on the `/chat` namespace.
    ///
    /// Fails with [`TransportError::Closed`] unless connected; nothing is queued.
    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) -> Result<(), TransportError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| TransportError::Codec(luci_shared::PacketError::InvalidPayload(e.to_string())))?;
        let packet = SocketPacket::event(CHAT_NAMESPACE, event, value);

        // State and session are read under the same lock the connection task
        // publishes under
        let session = self.inner.session.lock();
        let active = session.as_ref().ok_or(TransportError::Closed)?;
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        tracing::debug!(event, "emit");
        active
            .sender
            .unbounded_send(Outbound::Emit(packet))
            .map_err(|_| TransportError::Closed)
    }
}

/// Why a live link ended
enum LinkEnd {
    /// The manager asked for a disconnect
    Requested,
    /// Server closed, transport error or missed heartbeat
    Lost(String),
}

/// Connection management loop: connect, run, reconnect with a fixed delay
/// until the attempt budget is spent.
///
/// Every state change is conditional on `generation` still being the
/// current session; a replaced task closes its link and exits.
async fn run_connection_loop(
    inner: Arc<Inner>,
    url: Url,
    user_id: String,
    generation: u64,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let mut attempt = 0u32;

    loop {
        let state = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        };
        if !inner.set_state_if_current(generation, state) {
            return;
        }

        let reason = match establish(&inner, &url).await {
            Ok(link) => {
                attempt = 0;
                if !drain_stale(&mut outbound) {
                    tracing::debug!(user_id, "session closed during handshake");
                    goodbye(&link);
                    return;
                }
                // Announce presence so the server routes pushes to this session
                match inner.go_live(generation, &link, &user_id) {
                    Ok(false) => {
                        tracing::debug!(user_id, "session replaced during handshake");
                        goodbye(&link);
                        return;
                    }
                    Err(_) => "link closed before presence announcement".to_string(),
                    Ok(true) => {
                        tracing::info!(user_id, transport = ?link.kind, "realtime connected to {}", url);
                        match run_link(&inner, link, &mut outbound).await {
                            LinkEnd::Requested => {
                                tracing::info!(user_id, "realtime session closed");
                                return;
                            }
                            LinkEnd::Lost(reason) => {
                                tracing::warn!(user_id, "realtime connection lost: {}", reason);
                                if !inner.set_state_if_current(generation, ConnectionState::Disconnected) {
                                    return;
                                }
                                reason
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("realtime connect to {} failed: {}", url, e);
                e.to_string()
            }
        };

        attempt += 1;
        if !inner.reconnect.allows(attempt) {
            inner.set_state_if_current(
                generation,
                ConnectionState::Failed {
                    reason: format!(
                        "gave up after {} reconnect attempts: {}",
                        inner.reconnect.max_attempts, reason
                    ),
                },
            );
            return;
        }

        tracing::info!(
            "reconnecting to {} in {:?} (attempt {})",
            url,
            inner.reconnect.delay,
            attempt
        );
        tokio::select! {
            _ = tokio::time::sleep(inner.reconnect.delay) => {}
            cmd = outbound.next() => {
                if matches!(cmd, None | Some(Outbound::Disconnect)) {
                    return;
                }
            }
        }
    }
}

/// Drop emits queued while the link was down. False if a disconnect was
/// requested meanwhile.
fn drain_stale(outbound: &mut UnboundedReceiver<Outbound>) -> bool {
    loop {
        match outbound.try_next() {
            Ok(Some(Outbound::Emit(stale))) => {
                tracing::warn!("dropping command queued while disconnected: {:?}", stale);
            }
            Ok(Some(Outbound::Disconnect)) | Ok(None) => return false,
            Err(_) => return true,
        }
    }
}

fn goodbye(link: &Link) {
    let bye = SocketPacket::Disconnect { namespace: CHAT_NAMESPACE.to_string() };
    let _ = link.send(EnginePacket::Message(bye.encode()));
    let _ = link.send(EnginePacket::Close);
}

/// Open a link over the first transport that works, then join the namespace.
async fn establish(inner: &Inner, url: &Url) -> Result<Link, TransportError> {
    let timeout = inner.reconnect.connect_timeout;
    let mut last_error = TransportError::Connect("no transport configured".into());

    for kind in &inner.transports {
        match link::open(*kind, url, &inner.http, timeout).await {
            Ok(mut link) => {
                join_namespace(&mut link, timeout).await?;
                return Ok(link);
            }
            Err(e) => {
                tracing::warn!(transport = ?kind, "transport unavailable: {}", e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Socket.IO CONNECT to the chat namespace and wait for the server's answer.
async fn join_namespace(link: &mut Link, timeout: std::time::Duration) -> Result<(), TransportError> {
    let connect = SocketPacket::Connect {
        namespace: CHAT_NAMESPACE.to_string(),
        data: None,
    };
    link.send(EnginePacket::Message(connect.encode()))?;

    tokio::time::timeout(timeout, async {
        loop {
            match link.incoming.recv().await {
                Some(Ok(EnginePacket::Message(body))) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { namespace, .. } if namespace == CHAT_NAMESPACE => {
                        return Ok(());
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        return Err(TransportError::Handshake(format!(
                            "namespace refused: {}",
                            data.unwrap_or(Value::Null)
                        )));
                    }
                    _ => {}
                },
                Some(Ok(EnginePacket::Ping(data))) => link.send(EnginePacket::Pong(data))?,
                Some(Ok(EnginePacket::Close)) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            }
        }
    })
    .await
    .map_err(|_| TransportError::Timeout("waiting for namespace connect".into()))?
}

/// Pump a connected link until it ends.
async fn run_link(inner: &Inner, mut link: Link, outbound: &mut UnboundedReceiver<Outbound>) -> LinkEnd {
    let window = link.heartbeat_window();
    let mut deadline = tokio::time::Instant::now() + window;

    loop {
        tokio::select! {
            packet = link.incoming.recv() => {
                deadline = tokio::time::Instant::now() + window;
                match packet {
                    Some(Ok(EnginePacket::Ping(data))) => {
                        if link.send(EnginePacket::Pong(data)).is_err() {
                            return LinkEnd::Lost("link closed".into());
                        }
                    }
                    Some(Ok(EnginePacket::Message(body))) => match SocketPacket::decode(&body) {
                        Ok(SocketPacket::Event { namespace, ack_id, name, args }) if namespace == CHAT_NAMESPACE => {
                            let payload = args.into_iter().next().unwrap_or(Value::Null);
                            inner.dispatch(&name, &payload);
                            // Handlers return nothing, so the ack only confirms receipt
                            if let Some(ack_id) = ack_id {
                                let ack = SocketPacket::Ack { namespace, ack_id, args: Vec::new() };
                                if link.send(EnginePacket::Message(ack.encode())).is_err() {
                                    return LinkEnd::Lost("link closed".into());
                                }
                            }
                        }
                        Ok(SocketPacket::Disconnect { namespace }) if namespace == CHAT_NAMESPACE => {
                            return LinkEnd::Lost("server disconnected the namespace".into());
                        }
                        Ok(other) => tracing::debug!("ignoring socket packet {:?}", other),
                        Err(e) => tracing::warn!("undecodable socket packet {:?}: {}", body, e),
                    },
                    Some(Ok(EnginePacket::Close)) => return LinkEnd::Lost("server closed the session".into()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                    None => return LinkEnd::Lost("link closed".into()),
                }
            }
            cmd = outbound.next() => match cmd {
                Some(Outbound::Emit(packet)) => {
                    if link.send(EnginePacket::Message(packet.encode())).is_err() {
                        return LinkEnd::Lost("link closed".into());
                    }
                }
                Some(Outbound::Disconnect) | None => {
                    goodbye(&link);
                    return LinkEnd::Requested;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                return LinkEnd::Lost(format!("no heartbeat within {:?}", window));
            }
        }
    }
}

#[cfg(test)]
impl TransportManager {
    /// Install a session with no network task and mark it connected. The
    /// returned receiver yields every emitted command.
    pub(crate) fn attach_loopback(&self, user_id: &str) -> UnboundedReceiver<Outbound> {
        let (sender, receiver) = unbounded();
        let mut session = self.inner.session.lock();
        *session = Some(ActiveSession {
            user_id: user_id.to_string(),
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            sender,
            task: None,
        });
        self.inner.set_state(ConnectionState::Connected);
        receiver
    }

    pub(crate) fn set_state_for_test(&self, state: ConnectionState) {
        self.inner.set_state(state);
    }

    /// Simulate a server push.
    pub(crate) fn inject(&self, event: &str, payload: Value) {
        self.inner.dispatch(event, &payload);
    }
}

#[cfg(test)]
pub(crate) fn drain_emitted(rx: &mut UnboundedReceiver<Outbound>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    while let Ok(Some(cmd)) = rx.try_next() {
        if let Outbound::Emit(SocketPacket::Event { name, args, .. }) = cmd {
            out.push((name, args.into_iter().next().unwrap_or(Value::Null)));
        }
    }
    out
}
