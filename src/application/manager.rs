//! The realtime connection manager.
//!
//! [`RealtimeManager`] is a cheap, cloneable front for a single actor task
//! that owns the [`ConnectionRegistry`]. Caller commands, transport reports
//! and retry timers all arrive on one inbox and are handled one at a time,
//! so connection state needs no locks and a query always observes every
//! command sent before it.
//!
//! ```text
//! RealtimeManager ──Command──┐
//! LinkEvents ───────Link─────┼──► inbox ──► actor ──► ConnectionRegistry
//! retry timer ──ReconnectDue─┘                  └───► Transport::connect
//! ```
//!
//! When every `RealtimeManager` clone is dropped the actor closes all
//! connections and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::domain::foundation::ChannelId;
use crate::domain::realtime::{
    ChannelHandlers, ConnectionKey, ConnectionStatus, Dispatch, Endpoint, NotificationHandler,
    OutboundFrame, ReconnectPolicy,
};
use crate::ports::{LinkEvents, LinkId, Transport, TransportEvent};

use super::handle::ConnectionHandle;
use super::lifecycle::{AfterClose, ManagedConnection, Route};
use super::registry::ConnectionRegistry;

/// Errors returned by manager operations that wait for a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// The manager task is gone (a handler panicked, or the runtime is
    /// shutting down).
    #[error("Realtime manager has stopped")]
    Stopped,
}

/// Settings the manager needs to run.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub endpoint: Endpoint,
    pub chat_policy: ReconnectPolicy,
    pub notification_policy: ReconnectPolicy,
}

impl ManagerConfig {
    /// Default policies: linear 3s x5 for chat, fixed 3s forever for
    /// notifications.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            chat_policy: ReconnectPolicy::chat_default(),
            notification_policy: ReconnectPolicy::notifications_default(),
        }
    }

    pub fn with_chat_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.chat_policy = policy;
        self
    }

    pub fn with_notification_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.notification_policy = policy;
        self
    }
}

/// Everything the actor reacts to.
enum Inbox {
    OpenChannel {
        channel: ChannelId,
        handlers: ChannelHandlers,
        reply: oneshot::Sender<ConnectionHandle>,
    },
    OpenNotifications {
        handler: NotificationHandler,
        reply: oneshot::Sender<ConnectionHandle>,
    },
    Send {
        key: ConnectionKey,
        frame: OutboundFrame,
    },
    Close(ConnectionKey),
    CloseAll,
    Status {
        key: ConnectionKey,
        reply: oneshot::Sender<Option<ConnectionStatus>>,
    },
    OpenChannels {
        reply: oneshot::Sender<Vec<ChannelId>>,
    },
    Link {
        link: LinkId,
        event: TransportEvent,
    },
    ReconnectDue {
        key: ConnectionKey,
        token: u64,
    },
}

/// Handle to the connection manager.
///
/// # Example
///
/// ```ignore
/// let manager = RealtimeManager::start(config, Arc::new(WebSocketTransport::default()));
/// let general = ChannelId::new("general")?;
/// manager
///     .open_channel(general.clone(), ChannelHandlers::new().on_message(|m| println!("{m}")))
///     .await?;
/// manager.send_chat_message(&general, "hello");
/// ```
#[derive(Debug, Clone)]
pub struct RealtimeManager {
    inbox: mpsc::UnboundedSender<Inbox>,
}

impl RealtimeManager {
    /// Spawn the manager task on the current tokio runtime.
    pub fn start(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let actor = ManagerActor {
            config,
            transport,
            registry: ConnectionRegistry::new(),
            inbox: inbox_tx.downgrade(),
            next_link: 0,
            next_token: 0,
        };
        tokio::spawn(actor.run(inbox_rx));
        Self { inbox: inbox_tx }
    }

    /// Open (or reuse) the stream of a chat channel.
    ///
    /// Returns once the connection is registered and its stream requested;
    /// use the handle to wait for it to open. A channel that is already open
    /// or connecting is reused as is, keeping its original handlers.
    pub async fn open_channel(
        &self,
        channel: ChannelId,
        handlers: ChannelHandlers,
    ) -> Result<ConnectionHandle, ManagerError> {
        self.request(|reply| Inbox::OpenChannel {
            channel,
            handlers,
            reply,
        })
        .await
    }

    /// Open (or reuse) the notification stream.
    pub async fn open_notifications(
        &self,
        handler: NotificationHandler,
    ) -> Result<ConnectionHandle, ManagerError> {
        self.request(|reply| Inbox::OpenNotifications { handler, reply })
            .await
    }

    /// Close a channel and cancel its pending reconnection. No-op if absent.
    pub fn close_channel(&self, channel: &ChannelId) {
        self.post(Inbox::Close(ConnectionKey::Channel(channel.clone())));
    }

    /// Close the notification stream. No-op if absent.
    pub fn close_notifications(&self) {
        self.post(Inbox::Close(ConnectionKey::Notifications));
    }

    /// Close every channel and the notification stream.
    pub fn close_all(&self) {
        self.post(Inbox::CloseAll);
    }

    /// Post a chat message. Dropped unless the channel is open.
    pub fn send_chat_message(&self, channel: &ChannelId, message: impl Into<String>) {
        self.send_frame(
            ConnectionKey::Channel(channel.clone()),
            OutboundFrame::ChatMessage {
                message: message.into(),
            },
        );
    }

    pub fn start_typing(&self, channel: &ChannelId) {
        self.send_frame(
            ConnectionKey::Channel(channel.clone()),
            OutboundFrame::TypingStart,
        );
    }

    pub fn stop_typing(&self, channel: &ChannelId) {
        self.send_frame(
            ConnectionKey::Channel(channel.clone()),
            OutboundFrame::TypingStop,
        );
    }

    /// Send a read receipt for a channel message.
    pub fn mark_message_read(&self, channel: &ChannelId, message_id: impl Into<String>) {
        self.send_frame(
            ConnectionKey::Channel(channel.clone()),
            OutboundFrame::MessageRead {
                message_id: message_id.into(),
            },
        );
    }

    /// Mark a notification as read on the notification stream.
    pub fn mark_notification_read(&self, notification_id: impl Into<String>) {
        self.send_frame(
            ConnectionKey::Notifications,
            OutboundFrame::MarkRead {
                notification_id: notification_id.into(),
            },
        );
    }

    pub async fn channel_status(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<ConnectionStatus>, ManagerError> {
        let key = ConnectionKey::Channel(channel.clone());
        self.request(|reply| Inbox::Status { key, reply }).await
    }

    pub async fn notification_status(&self) -> Result<Option<ConnectionStatus>, ManagerError> {
        self.request(|reply| Inbox::Status {
            key: ConnectionKey::Notifications,
            reply,
        })
        .await
    }

    /// Channels currently in the registry, sorted. Includes closed channels
    /// waiting for (or out of) retries.
    pub async fn open_channels(&self) -> Result<Vec<ChannelId>, ManagerError> {
        self.request(|reply| Inbox::OpenChannels { reply }).await
    }

    fn send_frame(&self, key: ConnectionKey, frame: OutboundFrame) {
        self.post(Inbox::Send { key, frame });
    }

    fn post(&self, message: Inbox) {
        if self.inbox.send(message).is_err() {
            tracing::debug!("Realtime manager has stopped, dropping command");
        }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> Inbox,
    ) -> Result<T, ManagerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(message(reply_tx))
            .map_err(|_| ManagerError::Stopped)?;
        reply_rx.await.map_err(|_| ManagerError::Stopped)
    }
}

struct ManagerActor {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    registry: ConnectionRegistry,
    inbox: mpsc::WeakUnboundedSender<Inbox>,
    next_link: u64,
    next_token: u64,
}

impl ManagerActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Inbox>) {
        tracing::debug!(host = %self.config.endpoint.host(), "Realtime manager started");
        while let Some(message) = inbox.recv().await {
            self.handle(message);
        }
        self.close_all();
        tracing::debug!("Realtime manager stopped");
    }

    fn handle(&mut self, message: Inbox) {
        match message {
            Inbox::OpenChannel {
                channel,
                handlers,
                reply,
            } => {
                let url = self.config.endpoint.chat_url(&channel);
                let handle = self.open(
                    ConnectionKey::Channel(channel),
                    url,
                    Route::Channel(handlers),
                    self.config.chat_policy,
                );
                let _ = reply.send(handle);
            }
            Inbox::OpenNotifications { handler, reply } => {
                let url = self.config.endpoint.notifications_url();
                let handle = self.open(
                    ConnectionKey::Notifications,
                    url,
                    Route::Notifications(handler),
                    self.config.notification_policy,
                );
                let _ = reply.send(handle);
            }
            Inbox::Send { key, frame } => self.send(&key, &frame),
            Inbox::Close(key) => self.close(&key),
            Inbox::CloseAll => self.close_all(),
            Inbox::Status { key, reply } => {
                let _ = reply.send(self.registry.get(&key).map(ManagedConnection::status));
            }
            Inbox::OpenChannels { reply } => {
                let _ = reply.send(self.registry.channel_ids());
            }
            Inbox::Link { link, event } => self.on_link_event(link, event),
            Inbox::ReconnectDue { key, token } => self.on_reconnect_due(&key, token),
        }
    }

    fn open(
        &mut self,
        key: ConnectionKey,
        url: String,
        route: Route,
        policy: ReconnectPolicy,
    ) -> ConnectionHandle {
        if let Some(existing) = self.registry.get(&key) {
            if existing.state().is_live() {
                tracing::debug!(%key, state = %existing.state(), "Reusing connection");
                return existing.handle();
            }
        }

        let connection = ManagedConnection::new(key.clone(), url, route, policy);
        let handle = connection.handle();
        if let Some(mut previous) = self.registry.insert(connection) {
            tracing::debug!(%key, "Replacing closed connection");
            previous.shutdown();
        }
        tracing::info!(%key, "Opening connection");
        self.connect(&key);
        handle
    }

    /// Start a new link for the connection under `key`.
    fn connect(&mut self, key: &ConnectionKey) {
        let Some(url) = self.registry.get(key).map(|c| c.url().to_string()) else {
            return;
        };

        self.next_link += 1;
        let link_id = LinkId::new(self.next_link);
        let inbox = self.inbox.clone();
        let events = LinkEvents::new(link_id, move |link, event| {
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Inbox::Link { link, event });
            }
        });

        let link = self.transport.connect(&url, events);
        if let Some(connection) = self.registry.get_mut(key) {
            connection.attach_link(link_id, link);
            self.registry.bind_link(link_id, key.clone());
        }
        tracing::debug!(%key, link = %link_id, url = %url, "Link requested");
    }

    fn send(&mut self, key: &ConnectionKey, frame: &OutboundFrame) {
        let Some(connection) = self.registry.get_mut(key) else {
            tracing::debug!(%key, frame = frame.type_name(), "No connection, dropping frame");
            return;
        };
        if !connection.state().allows_send() {
            tracing::debug!(
                %key,
                state = %connection.state(),
                frame = frame.type_name(),
                "Connection not open, dropping frame"
            );
            return;
        }

        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to serialize frame");
                return;
            }
        };
        match connection.transmit(text) {
            Ok(()) => tracing::trace!(%key, frame = frame.type_name(), "Frame sent"),
            Err(e) => tracing::warn!(%key, error = %e, "Failed to send frame"),
        }
    }

    fn close(&mut self, key: &ConnectionKey) {
        if let Some(mut connection) = self.registry.remove(key) {
            connection.shutdown();
            tracing::info!(%key, "Connection closed");
        }
    }

    fn close_all(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let connections = self.registry.drain();
        let count = connections.len();
        for mut connection in connections {
            connection.shutdown();
        }
        tracing::info!(count, "All connections closed");
    }

    fn on_link_event(&mut self, link: LinkId, event: TransportEvent) {
        let Some(key) = self.registry.owner_of(link).cloned() else {
            tracing::trace!(%link, ?event, "Ignoring report from stale link");
            return;
        };

        match event {
            TransportEvent::Opened => {
                if let Some(connection) = self.registry.get_mut(&key) {
                    if connection.on_opened() {
                        tracing::info!(%key, %link, "Connection open");
                    }
                }
            }
            TransportEvent::Message(text) => {
                if let Some(connection) = self.registry.get(&key) {
                    log_dispatch(&key, connection.dispatch(&text));
                }
            }
            TransportEvent::Error(error) => {
                tracing::warn!(%key, %link, error = %error, "Transport error");
            }
            TransportEvent::Closed { code, reason } => {
                self.registry.unbind_link(link);
                let decision = match self.registry.get_mut(&key) {
                    Some(connection) => connection.on_closed(),
                    None => return,
                };
                match decision {
                    AfterClose::Retry { attempt, delay } => {
                        tracing::info!(
                            %key,
                            ?code,
                            reason = %reason,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Connection lost, reconnecting"
                        );
                        self.schedule_retry(&key, delay);
                    }
                    AfterClose::Exhausted => {
                        tracing::warn!(%key, ?code, reason = %reason, "Connection lost, retries exhausted");
                    }
                    AfterClose::Ignored => {}
                }
            }
        }
    }

    fn schedule_retry(&mut self, key: &ConnectionKey, delay: Duration) {
        self.next_token += 1;
        let token = self.next_token;
        let inbox = self.inbox.clone();
        let due_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Inbox::ReconnectDue {
                    key: due_key,
                    token,
                });
            }
        });
        match self.registry.get_mut(key) {
            Some(connection) => connection.set_retry(token, timer),
            None => timer.abort(),
        }
    }

    fn on_reconnect_due(&mut self, key: &ConnectionKey, token: u64) {
        let due = self
            .registry
            .get_mut(key)
            .is_some_and(|connection| connection.take_retry(token));
        if due {
            tracing::debug!(%key, "Reconnecting");
            self.connect(key);
        } else {
            tracing::trace!(%key, token, "Ignoring stale retry");
        }
    }
}

fn log_dispatch(key: &ConnectionKey, outcome: Dispatch) {
    match outcome {
        Dispatch::Delivered(kind) => tracing::trace!(%key, kind = kind.as_str(), "Frame delivered"),
        Dispatch::Notified => tracing::trace!(%key, "Notification delivered"),
        Dispatch::Reserved(kind) => {
            tracing::debug!(%key, kind = kind.as_str(), "No handler for frame, dropping")
        }
        Dispatch::Unrecognized(kind) => {
            tracing::debug!(%key, kind = %kind, "Unrecognized frame type, dropping")
        }
        Dispatch::Malformed(error) => {
            tracing::debug!(%key, error = %error, "Malformed frame, dropping")
        }
        Dispatch::HandlerPanicked { kind, message } => {
            tracing::warn!(%key, kind, panic = %message, "Handler panicked, frame dropped")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transport::{MockLinkController, MockTransport};
    use crate::domain::realtime::{Backoff, ConnectionState};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const STEP: Duration = Duration::from_millis(1);

    fn setup() -> (RealtimeManager, MockTransport) {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("chat.test", false).unwrap();
        let manager = RealtimeManager::start(ManagerConfig::new(endpoint), Arc::new(transport.clone()));
        (manager, transport)
    }

    fn channel(id: &str) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    fn recording_handlers() -> (ChannelHandlers, Arc<Mutex<Vec<(&'static str, Value)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let record = |slot: &'static str| {
            let log = log.clone();
            move |value: Value| log.lock().unwrap().push((slot, value))
        };
        let handlers = ChannelHandlers::new()
            .on_message(record("message"))
            .on_user_joined(record("joined"))
            .on_user_left(record("left"))
            .on_typing(record("typing"));
        (handlers, log)
    }

    /// Open a channel and complete its handshake.
    async fn open_channel(
        manager: &RealtimeManager,
        transport: &MockTransport,
        id: &str,
    ) -> MockLinkController {
        manager
            .open_channel(channel(id), ChannelHandlers::new())
            .await
            .unwrap();
        let link = transport.last_link().unwrap();
        link.open();
        link
    }

    async fn status(manager: &RealtimeManager, id: &str) -> Option<ConnectionStatus> {
        manager.channel_status(&channel(id)).await.unwrap()
    }

    // ════════════════════════════════════════════════════════════════════
    // Registry
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn open_channel_connects_to_chat_url() {
        let (manager, transport) = setup();

        let handle = manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();

        assert_eq!(transport.urls(), vec!["ws://chat.test/ws/chat/general/"]);
        assert_eq!(handle.key(), &ConnectionKey::Channel(channel("general")));
        assert_eq!(handle.status().state, ConnectionState::Connecting);
        assert_eq!(manager.open_channels().await.unwrap(), vec![channel("general")]);
    }

    #[tokio::test]
    async fn open_channel_twice_reuses_live_connection() {
        let (manager, transport) = setup();
        manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();
        manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();
        assert_eq!(transport.connect_count(), 1);

        transport.last_link().unwrap().open();
        manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(manager.open_channels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reopen_keeps_original_handlers() {
        let (manager, transport) = setup();
        let (first, first_log) = recording_handlers();
        let (second, second_log) = recording_handlers();

        manager.open_channel(channel("general"), first).await.unwrap();
        manager.open_channel(channel("general"), second).await.unwrap();
        let link = transport.last_link().unwrap();
        link.open();
        link.deliver(r#"{"type":"user_joined","username":"ada"}"#);
        status(&manager, "general").await;

        assert_eq!(first_log.lock().unwrap().len(), 1);
        assert!(second_log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_of_closed_channel_starts_fresh() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;
        link.drop_connection();
        assert_eq!(status(&manager, "general").await.unwrap().reconnect_attempts, 1);

        let handle = manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();

        assert_eq!(transport.connect_count(), 2);
        assert_eq!(handle.status(), ConnectionStatus::connecting());

        // The old retry was cancelled with the old entry.
        tokio::time::sleep(Duration::from_secs(3) + STEP).await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn close_channel_closes_link_and_forgets_channel() {
        let (manager, transport) = setup();
        let mut handle = manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();
        let link = transport.last_link().unwrap();
        link.open();

        manager.close_channel(&channel("general"));

        assert_eq!(status(&manager, "general").await, None);
        assert!(link.was_closed_by_client());
        assert!(manager.open_channels().await.unwrap().is_empty());
        assert_eq!(handle.wait_for(|s| s.retries_exhausted).await, None);
    }

    #[tokio::test]
    async fn close_of_unknown_channel_is_a_noop() {
        let (manager, transport) = setup();
        open_channel(&manager, &transport, "general").await;

        manager.close_channel(&channel("random"));

        assert!(status(&manager, "general").await.is_some());
    }

    #[tokio::test]
    async fn close_all_empties_registry_and_manager_stays_usable() {
        let (manager, transport) = setup();
        let a = open_channel(&manager, &transport, "a").await;
        let b = open_channel(&manager, &transport, "b").await;
        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        let notifications = transport.last_link().unwrap();

        manager.close_all();
        manager.close_all();

        assert!(manager.open_channels().await.unwrap().is_empty());
        assert_eq!(manager.notification_status().await.unwrap(), None);
        assert!(a.was_closed_by_client());
        assert!(b.was_closed_by_client());
        assert!(notifications.was_closed_by_client());

        open_channel(&manager, &transport, "a").await;
        assert_eq!(status(&manager, "a").await.unwrap().state, ConnectionState::Open);
    }

    // ════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn opened_report_makes_channel_open() {
        let (manager, transport) = setup();
        let mut handle = manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();

        transport.last_link().unwrap().open();

        let status = handle
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap();
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_channel_reconnects_after_linear_delay() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;

        link.drop_connection();
        let closed = status(&manager, "general").await.unwrap();
        assert_eq!(closed.state, ConnectionState::Closed);
        assert_eq!(closed.reconnect_attempts, 1);
        assert_eq!(closed.next_retry_in, Some(Duration::from_secs(3)));

        tokio::time::sleep(Duration::from_secs(3) - STEP).await;
        assert_eq!(transport.connect_count(), 1);

        tokio::time::sleep(STEP * 2).await;
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.link(1).unwrap().url(), "ws://chat.test/ws/chat/general/");
        assert_eq!(
            status(&manager, "general").await.unwrap().state,
            ConnectionState::Connecting
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_five_attempts() {
        let (manager, transport) = setup();
        let mut handle = manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();

        for attempt in 1..=5u32 {
            transport.last_link().unwrap().drop_connection();
            let status = status(&manager, "general").await.unwrap();
            assert_eq!(status.reconnect_attempts, attempt);

            let delay = Duration::from_secs(3) * attempt;
            tokio::time::sleep(delay - STEP).await;
            assert_eq!(transport.connect_count(), attempt as usize);
            tokio::time::sleep(STEP * 2).await;
            assert_eq!(transport.connect_count(), attempt as usize + 1);
        }

        transport.last_link().unwrap().drop_connection();
        let status = handle.wait_for(|s| s.retries_exhausted).await.unwrap();
        assert!(status.is_terminal());
        assert_eq!(status.next_retry_in, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 6);
        assert!(manager.open_channels().await.unwrap().contains(&channel("general")));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_reopen_resets_attempts() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;

        link.drop_connection();
        status(&manager, "general").await;
        tokio::time::sleep(Duration::from_secs(3) + STEP).await;
        transport.last_link().unwrap().drop_connection();
        assert_eq!(status(&manager, "general").await.unwrap().reconnect_attempts, 2);

        tokio::time::sleep(Duration::from_secs(6) + STEP).await;
        transport.last_link().unwrap().open();
        assert_eq!(status(&manager, "general").await.unwrap().reconnect_attempts, 0);

        // Next drop starts again at the first delay.
        transport.last_link().unwrap().drop_connection();
        let status = status(&manager, "general").await.unwrap();
        assert_eq!(status.reconnect_attempts, 1);
        assert_eq!(status.next_retry_in, Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_pending_retry_cancels_it() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;
        link.drop_connection();
        status(&manager, "general").await;

        manager.close_channel(&channel("general"));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(transport.connect_count(), 1);
        assert_eq!(status(&manager, "general").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn error_then_close_schedules_exactly_one_retry() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;

        link.fail("connection reset");
        link.closed(Some(1006), "duplicate");
        assert_eq!(status(&manager, "general").await.unwrap().reconnect_attempts, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn transport_error_alone_changes_nothing() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;

        link.error("tls alert");
        link.deliver("not json");

        let status = status(&manager, "general").await.unwrap();
        assert_eq!(status.state, ConnectionState::Open);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn reports_from_closed_link_are_ignored() {
        let (manager, transport) = setup();
        let (handlers, log) = recording_handlers();
        manager.open_channel(channel("general"), handlers).await.unwrap();
        let old = transport.last_link().unwrap();
        old.open();
        manager.close_channel(&channel("general"));

        let (handlers, _) = recording_handlers();
        manager.open_channel(channel("general"), handlers).await.unwrap();
        old.deliver(r#"{"type":"user_joined","username":"ghost"}"#);
        old.drop_connection();

        let status = status(&manager, "general").await.unwrap();
        assert_eq!(status.state, ConnectionState::Connecting);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_retry_forever_at_fixed_delay() {
        let (manager, transport) = setup();
        let mut handle = manager
            .open_notifications(NotificationHandler::new(|_| {}))
            .await
            .unwrap();
        assert_eq!(transport.urls(), vec!["ws://chat.test/ws/notifications/"]);

        for attempt in 1..=8u32 {
            transport.last_link().unwrap().drop_connection();
            let status = handle
                .wait_for(|s| s.state == ConnectionState::Closed)
                .await
                .unwrap();
            assert_eq!(status.reconnect_attempts, attempt);
            assert_eq!(status.next_retry_in, Some(Duration::from_secs(3)));
            assert!(!status.retries_exhausted);

            tokio::time::sleep(Duration::from_secs(3) + STEP).await;
            assert_eq!(transport.connect_count(), attempt as usize + 1);
        }
    }

    #[tokio::test]
    async fn notifications_and_channels_are_independent() {
        let (manager, transport) = setup();
        open_channel(&manager, &transport, "general").await;
        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        assert_eq!(transport.connect_count(), 2);

        manager.close_notifications();
        assert_eq!(
            status(&manager, "general").await.unwrap().state,
            ConnectionState::Open
        );
        assert_eq!(manager.notification_status().await.unwrap(), None);

        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        manager.close_channel(&channel("general"));
        assert!(manager.notification_status().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn panicking_handler_leaves_other_connections_running() {
        let (manager, transport) = setup();
        let (handlers, log) = recording_handlers();
        manager.open_channel(channel("general"), handlers).await.unwrap();
        let general = transport.last_link().unwrap();
        general.open();
        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        let notifications = transport.last_link().unwrap();
        notifications.open();
        manager
            .open_channel(
                channel("broken"),
                ChannelHandlers::new().on_message(|_| panic!("handler bug")),
            )
            .await
            .unwrap();
        let broken = transport.last_link().unwrap();
        broken.open();

        broken.deliver(r#"{"type":"chat_message","message":"hi"}"#);
        broken.deliver(r#"{"type":"chat_message","message":"again"}"#);
        general.deliver(r#"{"type":"chat_message","message":"still here"}"#);

        assert_eq!(
            manager.notification_status().await.unwrap().unwrap().state,
            ConnectionState::Open
        );
        assert_eq!(
            status(&manager, "broken").await.unwrap().state,
            ConnectionState::Open
        );
        assert!(!notifications.was_closed_by_client());
        assert!(!broken.was_closed_by_client());
        assert_eq!(*log.lock().unwrap(), vec![("message", json!("still here"))]);

        manager.send_chat_message(&channel("general"), "ok");
        manager.open_channels().await.unwrap();
        assert_eq!(general.sent_json().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_policy_is_honored() {
        let transport = MockTransport::new();
        let config = ManagerConfig::new(Endpoint::new("chat.test", true).unwrap()).with_chat_policy(
            ReconnectPolicy {
                backoff: Backoff::Exponential {
                    base: Duration::from_secs(1),
                    max: Duration::from_secs(2),
                },
                max_attempts: Some(3),
            },
        );
        let manager = RealtimeManager::start(config, Arc::new(transport.clone()));
        manager
            .open_channel(channel("general"), ChannelHandlers::new())
            .await
            .unwrap();
        assert_eq!(transport.urls(), vec!["wss://chat.test/ws/chat/general/"]);

        let mut delays = Vec::new();
        for _ in 0..3 {
            transport.last_link().unwrap().drop_connection();
            delays.push(status(&manager, "general").await.unwrap().next_retry_in);
            tokio::time::sleep(Duration::from_secs(2) + STEP).await;
        }
        transport.last_link().unwrap().drop_connection();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(2))
            ]
        );
        assert!(status(&manager, "general").await.unwrap().is_terminal());
    }

    // ════════════════════════════════════════════════════════════════════
    // Outbound frames
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn outbound_frames_are_serialized_when_open() {
        let (manager, transport) = setup();
        let general = channel("general");
        let link = open_channel(&manager, &transport, "general").await;

        manager.send_chat_message(&general, "hello");
        manager.start_typing(&general);
        manager.stop_typing(&general);
        manager.mark_message_read(&general, "m-1");
        status(&manager, "general").await;

        assert_eq!(
            link.sent_json(),
            vec![
                json!({"type": "chat_message", "message": "hello"}),
                json!({"type": "typing_start"}),
                json!({"type": "typing_stop"}),
                json!({"type": "message_read", "message_id": "m-1"}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sends_while_not_open_are_dropped_not_queued() {
        let (manager, transport) = setup();
        let general = channel("general");
        manager
            .open_channel(general.clone(), ChannelHandlers::new())
            .await
            .unwrap();
        let first = transport.last_link().unwrap();

        manager.send_chat_message(&general, "too early");
        manager.start_typing(&general);
        first.open();
        status(&manager, "general").await;
        assert!(first.sent_frames().is_empty());

        first.drop_connection();
        manager.send_chat_message(&general, "while closed");
        tokio::time::sleep(Duration::from_secs(3) + STEP).await;
        let second = transport.last_link().unwrap();
        second.open();
        manager.send_chat_message(&general, "after reopen");
        status(&manager, "general").await;

        assert!(first.sent_frames().is_empty());
        assert_eq!(
            second.sent_json(),
            vec![json!({"type": "chat_message", "message": "after reopen"})]
        );
    }

    #[tokio::test]
    async fn send_to_unknown_channel_is_a_noop() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;

        manager.send_chat_message(&channel("random"), "hello?");
        manager.mark_notification_read("n-1");
        status(&manager, "general").await;

        assert!(link.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn mark_notification_read_goes_to_notification_stream() {
        let (manager, transport) = setup();
        let chat = open_channel(&manager, &transport, "general").await;
        manager.open_notifications(NotificationHandler::new(|_| {})).await.unwrap();
        let notifications = transport.last_link().unwrap();
        notifications.open();

        manager.mark_notification_read("n-42");
        manager.notification_status().await.unwrap();

        assert_eq!(
            notifications.sent_json(),
            vec![json!({"type": "mark_read", "notification_id": "n-42"})]
        );
        assert!(chat.sent_frames().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════
    // Inbound frames
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn inbound_frames_reach_handlers_in_order() {
        let (manager, transport) = setup();
        let (handlers, log) = recording_handlers();
        manager.open_channel(channel("general"), handlers).await.unwrap();
        let link = transport.last_link().unwrap();
        link.open();

        link.deliver(r#"{"type":"user_joined","user_id":"7","username":"ada"}"#);
        link.deliver(r#"{"type":"chat_message","message":{"id":"1","message":"hi"}}"#);
        link.deliver(r#"{"type":"reaction_added"}"#);
        link.deliver("garbage");
        link.deliver(r#"{"type":"user_typing","user_id":"7","typing":true}"#);
        link.deliver(r#"{"type":"user_left","user_id":"7","username":"ada"}"#);
        status(&manager, "general").await;

        let slots: Vec<_> = log.lock().unwrap().iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec!["joined", "message", "typing", "left"]);
        assert_eq!(log.lock().unwrap()[1].1, json!({"id": "1", "message": "hi"}));
        assert_eq!(
            status(&manager, "general").await.unwrap().state,
            ConnectionState::Open
        );
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_survive_reconnect() {
        let (manager, transport) = setup();
        let (handlers, log) = recording_handlers();
        manager.open_channel(channel("general"), handlers).await.unwrap();
        transport.last_link().unwrap().open();
        transport.last_link().unwrap().drop_connection();
        status(&manager, "general").await;
        tokio::time::sleep(Duration::from_secs(3) + STEP).await;

        let link = transport.last_link().unwrap();
        link.open();
        link.deliver(r#"{"type":"chat_message","message":"again"}"#);
        status(&manager, "general").await;

        assert_eq!(*log.lock().unwrap(), vec![("message", json!("again"))]);
    }

    #[tokio::test]
    async fn notification_frames_delivered_whole() {
        let (manager, transport) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager
            .open_notifications(NotificationHandler::new(move |frame| {
                sink.lock().unwrap().push(frame)
            }))
            .await
            .unwrap();
        let link = transport.last_link().unwrap();
        link.open();

        link.deliver(r#"{"type":"user_notification","title":"Reply","id":"n-1"}"#);
        link.deliver("[1,2]");
        manager.notification_status().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"type": "user_notification", "title": "Reply", "id": "n-1"})]
        );
    }

    #[tokio::test]
    async fn dropping_manager_closes_everything() {
        let (manager, transport) = setup();
        let link = open_channel(&manager, &transport, "general").await;
        let probe = manager.clone();
        drop(manager);
        assert!(probe.channel_status(&channel("general")).await.unwrap().is_some());

        drop(probe);
        for _ in 0..10 {
            if link.was_closed_by_client() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(link.was_closed_by_client());
    }
}
