//! Named rooms for scoped broadcast.

use crate::connection::ConnectionId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Unique identifier for a room.
pub type RoomId = String;

/// A named set of connection identities.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: DashMap<ConnectionId, ()>,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            members: DashMap::new(),
        }
    }

    /// The room's name.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Add an identity. Returns `false` if it was already a member.
    fn join(&self, connection_id: ConnectionId) -> bool {
        self.members.insert(connection_id, ()).is_none()
    }

    /// Remove an identity. Returns `false` if it was not a member.
    fn leave(&self, connection_id: &str) -> bool {
        self.members.remove(connection_id).is_some()
    }

    /// Whether the identity is currently a member.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snapshot of member identities at call time.
    pub fn members(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|r| r.key().clone()).collect()
    }
}

/// Tracks room membership for all connections.
///
/// Rooms are created implicitly on first join and collected as soon as
/// they become empty; there is no explicit create or delete. The manager
/// owns the authoritative identity-to-rooms mapping, so tearing down a
/// connection is a single [`RoomManager::remove_connection`] call.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: DashMap<RoomId, Arc<Room>>,
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection_id` to `room_id`, creating the room on first join.
    /// Idempotent.
    pub fn join(&self, connection_id: &str, room_id: &str) {
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_id.to_string())))
            .clone();
        if room.join(connection_id.to_string()) {
            tracing::debug!(connection_id = %connection_id, room = %room_id, "joined room");
        }
        self.memberships
            .entry(connection_id.to_string())
            .or_default()
            .insert(room_id.to_string());
    }

    /// Remove `connection_id` from `room_id`. Idempotent: leaving a room
    /// one is not in, or one that does not exist, is a no-op.
    pub fn leave(&self, connection_id: &str, room_id: &str) {
        let room = self.rooms.get(room_id).map(|r| Arc::clone(r.value()));
        if let Some(room) = room
            && room.leave(connection_id)
        {
            tracing::debug!(connection_id = %connection_id, room = %room_id, "left room");
        }
        if let Some(mut rooms) = self.memberships.get_mut(connection_id) {
            rooms.remove(room_id);
        }
        // remove_if keeps the empty-check and the removal atomic, so a
        // concurrent join cannot be dropped.
        self.rooms.remove_if(room_id, |_, room| room.is_empty());
    }

    /// Detach `connection_id` from every room it is in.
    ///
    /// The membership index is dropped first, so no new joins can race
    /// the per-room removal for this identity.
    pub fn remove_connection(&self, connection_id: &str) {
        if let Some((_, room_ids)) = self.memberships.remove(connection_id) {
            for room_id in room_ids {
                let room = self.rooms.get(&room_id).map(|r| Arc::clone(r.value()));
                if let Some(room) = room {
                    room.leave(connection_id);
                }
                self.rooms.remove_if(&room_id, |_, room| room.is_empty());
            }
        }
    }

    /// Current member identities of `room_id`, empty if the room does
    /// not exist. The snapshot may be stale by the time the caller acts
    /// on it.
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members())
            .unwrap_or_default()
    }

    /// Rooms `connection_id` currently belongs to.
    pub fn rooms_of(&self, connection_id: &str) -> Vec<RoomId> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the room currently exists (has at least one member).
    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Whether `connection_id` is in `room_id`.
    pub fn is_member(&self, connection_id: &str, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|room| room.contains(connection_id))
            .unwrap_or(false)
    }

    /// Names of all live rooms.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_creates_room_implicitly() {
        let rooms = RoomManager::new();
        assert!(!rooms.contains_room("room1"));
        rooms.join("a", "room1");
        assert!(rooms.contains_room("room1"));
        assert_eq!(rooms.members("room1"), vec!["a".to_string()]);
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let rooms = RoomManager::new();
        rooms.join("a", "room1");
        rooms.join("a", "room1");
        assert_eq!(rooms.members("room1").len(), 1);

        rooms.leave("a", "room1");
        rooms.leave("a", "room1");
        rooms.leave("b", "never-existed");
        assert!(rooms.members("room1").is_empty());
    }

    #[test]
    fn empty_room_is_collected() {
        let rooms = RoomManager::new();
        rooms.join("a", "room1");
        rooms.join("b", "room1");
        rooms.leave("a", "room1");
        assert!(rooms.contains_room("room1"));
        rooms.leave("b", "room1");
        assert!(!rooms.contains_room("room1"));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn remove_connection_detaches_from_all_rooms() {
        let rooms = RoomManager::new();
        rooms.join("a", "room1");
        rooms.join("a", "room2");
        rooms.join("b", "room1");

        rooms.remove_connection("a");
        assert!(rooms.rooms_of("a").is_empty());
        assert!(!rooms.is_member("a", "room1"));
        assert!(rooms.is_member("b", "room1"));
        // room2 lost its only member and is gone.
        assert!(!rooms.contains_room("room2"));
    }

    #[test]
    fn rooms_of_tracks_membership() {
        let rooms = RoomManager::new();
        rooms.join("a", "room1");
        rooms.join("a", "room2");
        let mut of_a = rooms.rooms_of("a");
        of_a.sort();
        assert_eq!(of_a, vec!["room1".to_string(), "room2".to_string()]);
    }
}
