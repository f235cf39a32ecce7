// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room membership: which connections are registered under which room.
//!
//! A room exists only while it has at least one member. It is created by the
//! first join and removed by the last leave.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::connection::{ConnHandle, ConnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotMember,
    Left { remaining: usize },
    /// The connection was the last member; the room entry is gone.
    RoomClosed,
}

/// Room id -> members in join order.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: HashMap<String, IndexMap<ConnId, ConnHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, room_id: &str, conn: &ConnHandle) -> JoinOutcome {
        let members = self.rooms.entry(room_id.to_owned()).or_default();
        if members.contains_key(&conn.id()) {
            return JoinOutcome::AlreadyMember;
        }
        members.insert(conn.id(), conn.clone());
        JoinOutcome::Joined
    }

    pub fn leave(&mut self, room_id: &str, conn: ConnId) -> LeaveOutcome {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome::NotMember;
        };
        if members.shift_remove(&conn).is_none() {
            return LeaveOutcome::NotMember;
        }
        if members.is_empty() {
            self.rooms.remove(room_id);
            return LeaveOutcome::RoomClosed;
        }
        LeaveOutcome::Left { remaining: members.len() }
    }

    /// Snapshot of a room's members, safe to iterate while the registry changes.
    pub fn members(&self, room_id: &str) -> Vec<ConnHandle> {
        self.rooms.get(room_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    pub fn contains(&self, room_id: &str, conn: ConnId) -> bool {
        self.rooms.get(room_id).is_some_and(|m| m.contains_key(&conn))
    }

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, IndexMap::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total registrations across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.values().map(IndexMap::len).sum()
    }
}
