//! Connection registry for one session.
//!
//! Tracks the single producer connection and the set of viewer connections,
//! each with its last pong time. The producer is held in a [`ProducerSlot`]
//! so "no producer" and "producer bound" are distinct states rather than an
//! optional field.

use std::collections::BTreeMap;
use std::time::Instant;

use tether_types::{ConnId, Role};

/// One live socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Relay-local id.
    pub id: ConnId,
    /// Producer or viewer.
    pub role: Role,
    /// Last time the peer proved it is alive (starts at connect time).
    pub last_pong_at: Instant,
}

impl Connection {
    /// A connection that just opened.
    pub fn new(id: ConnId, role: Role, now: Instant) -> Self {
        Self {
            id,
            role,
            last_pong_at: now,
        }
    }
}

/// Producer binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProducerSlot {
    /// No producer socket.
    #[default]
    Detached,
    /// A producer socket is bound.
    Attached(Connection),
}

/// Producer slot plus viewer set.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    producer: ProducerSlot,
    viewers: BTreeMap<ConnId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a producer, returning the connection it replaced.
    pub fn bind_producer(&mut self, conn: Connection) -> Option<Connection> {
        match std::mem::replace(&mut self.producer, ProducerSlot::Attached(conn)) {
            ProducerSlot::Attached(old) => Some(old),
            ProducerSlot::Detached => None,
        }
    }

    /// Admit a viewer.
    pub fn add_viewer(&mut self, conn: Connection) {
        self.viewers.insert(conn.id, conn);
    }

    /// Remove a connection. Returns it if it was registered.
    ///
    /// Removing an unknown id (already evicted or timed out) is a no-op, which
    /// is what makes close cleanup run exactly once.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        if let ProducerSlot::Attached(conn) = &self.producer {
            if conn.id == id {
                return match std::mem::take(&mut self.producer) {
                    ProducerSlot::Attached(conn) => Some(conn),
                    ProducerSlot::Detached => None,
                };
            }
        }
        self.viewers.remove(&id)
    }

    /// The producer slot.
    pub fn producer_slot(&self) -> &ProducerSlot {
        &self.producer
    }

    /// The bound producer, if any.
    pub fn producer(&self) -> Option<&Connection> {
        match &self.producer {
            ProducerSlot::Attached(conn) => Some(conn),
            ProducerSlot::Detached => None,
        }
    }

    /// Viewer ids in ascending order.
    pub fn viewer_ids(&self) -> Vec<ConnId> {
        self.viewers.keys().copied().collect()
    }

    /// Number of viewers.
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Role of a registered connection.
    pub fn role_of(&self, id: ConnId) -> Option<Role> {
        self.get(id).map(|conn| conn.role)
    }

    /// Look up a registered connection.
    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        match &self.producer {
            ProducerSlot::Attached(conn) if conn.id == id => Some(conn),
            _ => self.viewers.get(&id),
        }
    }

    /// Refresh a connection's liveness. Returns false for unknown ids.
    pub fn record_pong(&mut self, id: ConnId, now: Instant) -> bool {
        let conn = match &mut self.producer {
            ProducerSlot::Attached(conn) if conn.id == id => Some(conn),
            _ => self.viewers.get_mut(&id),
        };
        match conn {
            Some(conn) => {
                conn.last_pong_at = now;
                true
            }
            None => false,
        }
    }

    /// Every connection, producer first.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.producer().into_iter().chain(self.viewers.values())
    }

    /// Check if no socket is registered.
    pub fn is_empty(&self) -> bool {
        matches!(self.producer, ProducerSlot::Detached) && self.viewers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64, role: Role) -> Connection {
        Connection::new(ConnId::new(id), role, Instant::now())
    }

    #[test]
    fn second_producer_replaces_first() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.bind_producer(conn(1, Role::Producer)).is_none());
        let evicted = registry.bind_producer(conn(2, Role::Producer)).unwrap();

        assert_eq!(evicted.id, ConnId::new(1));
        assert_eq!(registry.producer().unwrap().id, ConnId::new(2));
    }

    #[test]
    fn evicted_producer_removal_is_noop() {
        let mut registry = ConnectionRegistry::new();
        registry.bind_producer(conn(1, Role::Producer));
        registry.bind_producer(conn(2, Role::Producer));

        assert!(registry.remove(ConnId::new(1)).is_none());
        assert_eq!(registry.producer().unwrap().id, ConnId::new(2));
    }

    #[test]
    fn remove_producer_detaches_slot() {
        let mut registry = ConnectionRegistry::new();
        registry.bind_producer(conn(1, Role::Producer));

        assert_eq!(registry.remove(ConnId::new(1)).unwrap().role, Role::Producer);
        assert_eq!(registry.producer_slot(), &ProducerSlot::Detached);
        assert!(registry.is_empty());
    }

    #[test]
    fn viewers_are_tracked_in_order() {
        let mut registry = ConnectionRegistry::new();
        registry.add_viewer(conn(5, Role::Viewer));
        registry.add_viewer(conn(3, Role::Viewer));

        assert_eq!(registry.viewer_ids(), vec![ConnId::new(3), ConnId::new(5)]);
        assert_eq!(registry.role_of(ConnId::new(5)), Some(Role::Viewer));

        registry.remove(ConnId::new(3));
        assert_eq!(registry.viewer_count(), 1);
        assert!(registry.remove(ConnId::new(3)).is_none());
    }

    #[test]
    fn pong_updates_liveness() {
        let mut registry = ConnectionRegistry::new();
        let start = Instant::now();
        registry.add_viewer(Connection::new(ConnId::new(1), Role::Viewer, start));

        let later = start + std::time::Duration::from_secs(10);
        assert!(registry.record_pong(ConnId::new(1), later));
        assert_eq!(registry.get(ConnId::new(1)).unwrap().last_pong_at, later);
        assert!(!registry.record_pong(ConnId::new(9), later));
    }

    #[test]
    fn connections_lists_producer_first() {
        let mut registry = ConnectionRegistry::new();
        registry.add_viewer(conn(1, Role::Viewer));
        registry.bind_producer(conn(2, Role::Producer));

        let ids: Vec<_> = registry.connections().map(|c| c.id).collect();
        assert_eq!(ids, vec![ConnId::new(2), ConnId::new(1)]);
    }
}
