//! Caller-side view of one managed connection.

use tokio::sync::watch;

use crate::domain::realtime::{ConnectionKey, ConnectionStatus};

/// Returned by `open_channel` / `open_notifications`.
///
/// Holds no resources: dropping it does not close the connection. Once the
/// connection is closed explicitly the handle goes stale and the waiting
/// methods return `None`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    key: ConnectionKey,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    pub(crate) fn new(key: ConnectionKey, status: watch::Receiver<ConnectionStatus>) -> Self {
        Self { key, status }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Latest published status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// False once the connection was closed and removed from the registry.
    pub fn is_registered(&self) -> bool {
        self.status.has_changed().is_ok()
    }

    /// Wait for the next status change.
    pub async fn changed(&mut self) -> Option<ConnectionStatus> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// ```ignore
    /// let status = handle.wait_for(|s| s.retries_exhausted).await;
    /// ```
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&ConnectionStatus) -> bool,
    ) -> Option<ConnectionStatus> {
        self.status.wait_for(predicate).await.ok().map(|status| *status)
    }
}
