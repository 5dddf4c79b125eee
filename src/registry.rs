//! The authoritative store of active connections.

use crate::connection::{Connection, ConnectionId};
use crate::error::{WsError, WsResult};
use crate::room::RoomManager;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-memory registry of all live connections, plus their room
/// memberships.
///
/// Every handle stored here is `Open` or `Closing`; closed handles are
/// removed synchronously with their closure by the session teardown.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    rooms: RoomManager,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its identity.
    ///
    /// Fails with [`WsError::DuplicateIdentity`] if the identity is
    /// already registered.
    pub fn add(&self, connection: Connection) -> WsResult<()> {
        match self.connections.entry(connection.id().clone()) {
            Entry::Occupied(entry) => Err(WsError::DuplicateIdentity(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove a connection and detach it from every room.
    ///
    /// Idempotent: removing an absent identity is a no-op and returns
    /// `None`.
    pub fn remove(&self, connection_id: &str) -> Option<Connection> {
        let removed = self.connections.remove(connection_id).map(|(_, c)| c);
        self.rooms.remove_connection(connection_id);
        removed
    }

    /// Look up a connection handle.
    ///
    /// Fails with [`WsError::ConnectionNotFound`] when the identity is
    /// absent.
    pub fn get(&self, connection_id: &str) -> WsResult<Connection> {
        self.find(connection_id)
            .ok_or_else(|| WsError::ConnectionNotFound(connection_id.to_string()))
    }

    /// Look up a connection handle, `None` when absent.
    pub fn find(&self, connection_id: &str) -> Option<Connection> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Whether the identity is registered.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Handles of every connection currently in `room_id`.
    ///
    /// A snapshot at call time with no isolation beyond that instant;
    /// members that disconnect before the caller acts simply yield
    /// `ConnectionNotFound`/`ConnectionClosed` on their next send.
    pub fn list_by_room(&self, room_id: &str) -> Vec<Connection> {
        self.rooms
            .members(room_id)
            .iter()
            .filter_map(|id| self.find(id))
            .collect()
    }

    /// The room membership manager.
    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Identities of all registered connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.key().clone()).collect()
    }

    /// Snapshot of all registered connection handles.
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use tokio::sync::mpsc;

    fn connection(id: &str) -> (Connection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id.to_string(), None, tx), rx)
    }

    #[test]
    fn get_after_add_returns_same_handle() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection("a");
        registry.add(conn).unwrap();
        assert_eq!(registry.get("a").unwrap().id(), "a");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = connection("a");
        let (second, _rx2) = connection("a");
        registry.add(first).unwrap();
        assert!(matches!(
            registry.add(second),
            Err(WsError::DuplicateIdentity(id)) if id == "a"
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection("a");
        registry.add(conn).unwrap();
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(matches!(
            registry.get("a"),
            Err(WsError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn remove_detaches_from_all_rooms() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connection("a");
        registry.add(conn).unwrap();
        registry.rooms().join("a", "room1");
        registry.rooms().join("a", "room2");

        registry.remove("a");
        assert!(registry.rooms().rooms_of("a").is_empty());
        assert!(!registry.rooms().contains_room("room1"));
        assert!(!registry.rooms().contains_room("room2"));
    }

    #[test]
    fn list_by_room_resolves_live_handles_only() {
        let registry = ConnectionRegistry::new();
        let (a, _rxa) = connection("a");
        let (b, _rxb) = connection("b");
        registry.add(a).unwrap();
        registry.add(b).unwrap();
        registry.rooms().join("a", "room1");
        registry.rooms().join("b", "room1");

        assert_eq!(registry.list_by_room("room1").len(), 2);

        // A membership entry whose connection vanished is skipped.
        registry.connections.remove("a");
        assert_eq!(registry.list_by_room("room1").len(), 1);
    }
}
