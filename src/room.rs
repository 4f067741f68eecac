//! Rooms and the room registry
//!
//! A room is a named broadcast group with any number of members. Rooms are
//! never deleted; one that every member left stays around, empty, and can
//! be joined again.

use std::collections::{HashMap, HashSet};

use crate::error::AppError;
use crate::types::{uniquify, ClientId};

/// Named chat room
#[derive(Debug)]
pub struct Room {
    /// Room name, unique among rooms
    pub name: String,
    /// Current members
    pub members: HashSet<ClientId>,
}

impl Room {
    /// Create a new room whose only member is the creator
    pub fn new(name: String, creator: ClientId) -> Self {
        let mut members = HashSet::new();
        members.insert(creator);
        Self { name, members }
    }

    /// Add a member; adding an existing member is a no-op
    pub fn add_member(&mut self, client_id: ClientId) {
        self.members.insert(client_id);
    }

    /// Remove a member
    ///
    /// Returns false if the client was not a member.
    pub fn remove_member(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id)
    }

    /// Check if a client is in this room
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Every member except `sender`
    pub fn recipients(&self, sender: ClientId) -> Vec<ClientId> {
        self.members
            .iter()
            .copied()
            .filter(|id| *id != sender)
            .collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// All rooms, keyed by name
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room named after `preferred` with `creator` as sole member
    ///
    /// The name is trimmed and made unique among rooms. Returns the final
    /// name.
    pub fn create_room(&mut self, preferred: &str, creator: ClientId) -> Result<String, AppError> {
        let preferred = preferred.trim();
        if preferred.is_empty() {
            return Err(AppError::EmptyRoomName);
        }

        let name = uniquify(preferred, |candidate| self.rooms.contains_key(candidate));
        self.rooms
            .insert(name.clone(), Room::new(name.clone(), creator));
        Ok(name)
    }

    pub fn join(&mut self, room: &str, client_id: ClientId) -> Result<(), AppError> {
        let room = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| AppError::RoomNotFound(room.to_string()))?;
        room.add_member(client_id);
        Ok(())
    }

    pub fn leave(&mut self, room: &str, client_id: ClientId) -> Result<(), AppError> {
        let entry = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| AppError::RoomNotFound(room.to_string()))?;
        if entry.remove_member(client_id) {
            Ok(())
        } else {
            Err(AppError::NotInRoom(room.to_string()))
        }
    }

    /// Members of `room` a message from `sender` should reach
    pub fn recipients(&self, room: &str, sender: ClientId) -> Result<Vec<ClientId>, AppError> {
        self.rooms
            .get(room)
            .map(|r| r.recipients(sender))
            .ok_or_else(|| AppError::RoomNotFound(room.to_string()))
    }

    /// Drop a client from every room it belongs to
    pub fn remove_everywhere(&mut self, client_id: ClientId) {
        for room in self.rooms.values_mut() {
            room.remove_member(client_id);
        }
    }

    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn get(&self, room: &str) -> Option<&Room> {
        self.rooms.get(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
