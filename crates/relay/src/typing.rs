// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-room "is typing" marks. A mark exists only while the person is typing.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct TypingTracker {
    rooms: HashMap<String, HashSet<String>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mark. Returns `false` if it was already set.
    pub fn start(&mut self, room_id: &str, person_id: &str) -> bool {
        self.rooms.entry(room_id.to_owned()).or_default().insert(person_id.to_owned())
    }

    /// Clear the mark. Returns `true` if the person was marked typing.
    pub fn stop(&mut self, room_id: &str, person_id: &str) -> bool {
        let Some(people) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let was_typing = people.remove(person_id);
        if people.is_empty() {
            self.rooms.remove(room_id);
        }
        was_typing
    }

    pub fn is_typing(&self, room_id: &str, person_id: &str) -> bool {
        self.rooms.get(room_id).is_some_and(|p| p.contains(person_id))
    }

    /// Drop every mark for a room that no longer exists.
    pub fn clear_room(&mut self, room_id: &str) -> usize {
        self.rooms.remove(room_id).map_or(0, |p| p.len())
    }

    pub fn typing_in(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashSet::len)
    }
}
