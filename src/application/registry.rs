//! Connection Registry.
//!
//! Owns every managed connection: one per chat channel plus the
//! notification singleton. It also remembers which link belongs to which
//! connection, so transport reports can be routed and reports from links
//! that are no longer current can be recognized.
//!
//! The registry lives inside the manager actor and is never shared.

use std::collections::HashMap;

use crate::domain::foundation::ChannelId;
use crate::domain::realtime::ConnectionKey;
use crate::ports::LinkId;

use super::lifecycle::ManagedConnection;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    channels: HashMap<ChannelId, ManagedConnection>,
    notifications: Option<ManagedConnection>,
    links: HashMap<LinkId, ConnectionKey>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&ManagedConnection> {
        match key {
            ConnectionKey::Channel(id) => self.channels.get(id),
            ConnectionKey::Notifications => self.notifications.as_ref(),
        }
    }

    pub fn get_mut(&mut self, key: &ConnectionKey) -> Option<&mut ManagedConnection> {
        match key {
            ConnectionKey::Channel(id) => self.channels.get_mut(id),
            ConnectionKey::Notifications => self.notifications.as_mut(),
        }
    }

    /// Store a connection under its key. Any previous entry is removed and
    /// returned; its links are forgotten.
    pub fn insert(&mut self, connection: ManagedConnection) -> Option<ManagedConnection> {
        let key = connection.key().clone();
        let previous = self.remove(&key);
        match key {
            ConnectionKey::Channel(id) => {
                self.channels.insert(id, connection);
            }
            ConnectionKey::Notifications => self.notifications = Some(connection),
        }
        previous
    }

    /// Take a connection out of the registry, forgetting its links.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<ManagedConnection> {
        self.links.retain(|_, owner| owner != key);
        match key {
            ConnectionKey::Channel(id) => self.channels.remove(id),
            ConnectionKey::Notifications => self.notifications.take(),
        }
    }

    /// Take every connection out, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<ManagedConnection> {
        self.links.clear();
        let mut drained: Vec<_> = self.channels.drain().map(|(_, conn)| conn).collect();
        drained.extend(self.notifications.take());
        drained
    }

    pub fn bind_link(&mut self, link: LinkId, key: ConnectionKey) {
        self.links.insert(link, key);
    }

    pub fn unbind_link(&mut self, link: LinkId) -> Option<ConnectionKey> {
        self.links.remove(&link)
    }

    /// The connection a link reports for, if the link is still current.
    pub fn owner_of(&self, link: LinkId) -> Option<&ConnectionKey> {
        self.links.get(&link)
    }

    /// Registered channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len() + usize::from(self.notifications.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
