//! Connection Lifecycle Controller.
//!
//! A [`ManagedConnection`] is one registry entry: where it connects, who
//! receives its frames, how it retries, and where it is in
//! Connecting → Open → Closed → (retry) → Connecting.
//!
//! The manager actor feeds transport events in and acts on what comes back
//! (schedule a retry, give up). Every change is published on the entry's
//! status watch.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::foundation::StateMachine;
use crate::domain::realtime::{
    dispatch_channel_frame, dispatch_notification_frame, ChannelHandlers, ConnectionKey,
    ConnectionState, ConnectionStatus, Dispatch, NotificationHandler, ReconnectPolicy,
};
use crate::ports::{Link, LinkId, TransportError};

use super::handle::ConnectionHandle;

/// Where inbound frames of a connection go.
#[derive(Debug, Clone)]
pub enum Route {
    Channel(ChannelHandlers),
    Notifications(NotificationHandler),
}

/// What the controller decided after a link closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterClose {
    /// Reconnect after `delay`; this is attempt number `attempt`.
    Retry { attempt: u32, delay: Duration },

    /// The policy refused another attempt.
    Exhausted,

    /// The event did not apply (already closed).
    Ignored,
}

/// A pending retry timer and the token it will present when it fires.
#[derive(Debug)]
struct PendingRetry {
    token: u64,
    timer: JoinHandle<()>,
}

/// One live entry of the registry.
pub struct ManagedConnection {
    key: ConnectionKey,
    url: String,
    route: Route,
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    exhausted: bool,
    link: Option<(LinkId, Box<dyn Link>)>,
    retry: Option<PendingRetry>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ManagedConnection {
    /// A new entry in `Connecting` with no attempts made.
    pub fn new(key: ConnectionKey, url: String, route: Route, policy: ReconnectPolicy) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::connecting());
        Self {
            key,
            url,
            route,
            policy,
            state: ConnectionState::Connecting,
            attempts: 0,
            exhausted: false,
            link: None,
            retry: None,
            status_tx,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_link(&self) -> Option<LinkId> {
        self.link.as_ref().map(|(id, _)| *id)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            reconnect_attempts: self.attempts,
            retries_exhausted: self.exhausted,
            next_retry_in: self
                .retry
                .as_ref()
                .map(|_| self.policy.backoff.delay_for(self.attempts)),
        }
    }

    /// A new caller-side view of this entry.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.key.clone(), self.status_tx.subscribe())
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Install the link of a fresh open attempt.
    ///
    /// Valid for a new entry and for a closed one whose retry just fired.
    pub fn attach_link(&mut self, id: LinkId, link: Box<dyn Link>) {
        if self.state == ConnectionState::Closed {
            self.state = ConnectionState::Connecting;
        }
        self.retry = None;
        if let Some((_, mut old)) = self.link.replace((id, link)) {
            old.close();
        }
        self.publish();
    }

    /// The transport reports the stream ready.
    pub fn on_opened(&mut self) -> bool {
        match self.state.transition_to(ConnectionState::Open) {
            Ok(next) => {
                self.state = next;
                self.attempts = 0;
                self.exhausted = false;
                self.publish();
                true
            }
            Err(e) => {
                tracing::debug!(key = %self.key, error = %e, "Ignoring open report");
                false
            }
        }
    }

    /// The transport reports the stream gone. Decides whether to retry.
    pub fn on_closed(&mut self) -> AfterClose {
        let Ok(next) = self.state.transition_to(ConnectionState::Closed) else {
            return AfterClose::Ignored;
        };
        self.state = next;
        self.link = None;

        let decision = match self.policy.next_attempt(self.attempts) {
            Some((attempt, delay)) => {
                self.attempts = attempt;
                AfterClose::Retry { attempt, delay }
            }
            None => {
                self.exhausted = true;
                AfterClose::Exhausted
            }
        };
        self.publish();
        decision
    }

    /// Remember the timer of the retry `on_closed` asked for.
    pub fn set_retry(&mut self, token: u64, timer: JoinHandle<()>) {
        if let Some(old) = self.retry.replace(PendingRetry { token, timer }) {
            old.timer.abort();
        }
        self.publish();
    }

    /// True when `token` belongs to the pending retry. The retry is consumed.
    pub fn take_retry(&mut self, token: u64) -> bool {
        match &self.retry {
            Some(pending) if pending.token == token && self.state == ConnectionState::Closed => {
                self.retry = None;
                true
            }
            _ => false,
        }
    }

    /// Write one serialized frame to the current link.
    pub fn transmit(&mut self, text: String) -> Result<(), TransportError> {
        match self.link.as_mut() {
            Some((_, link)) if self.state.allows_send() => link.send_text(text),
            _ => Err(TransportError::LinkClosed),
        }
    }

    /// Route one inbound payload to the caller's handlers.
    pub fn dispatch(&self, raw: &str) -> Dispatch {
        match &self.route {
            Route::Channel(handlers) => dispatch_channel_frame(handlers, raw),
            Route::Notifications(handler) => dispatch_notification_frame(handler, raw),
        }
    }

    /// Cancel the pending retry and close the link. Returns the link that was
    /// closed, if any.
    pub fn shutdown(&mut self) -> Option<LinkId> {
        if let Some(pending) = self.retry.take() {
            pending.timer.abort();
        }
        let closed = self.link.take().map(|(id, mut link)| {
            link.close();
            id
        });
        self.state = ConnectionState::Closed;
        self.publish();
        closed
    }
}

impl std::fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("key", &self.key)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("attempts", &self.attempts())
            .field("exhausted", &self.exhausted)
            .field("link", &self.current_link())
            .finish_non_exhaustive()
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
