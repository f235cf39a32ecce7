// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight chunked uploads keyed by client-chosen file id.
//!
//! Chunks are base64 slices of one file. They may arrive in any order; the
//! payload is rebuilt strictly by slot index once every slot is filled. The
//! relay never decodes the payload; chunk text is concatenated as sent.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::connection::{ConnHandle, ConnId};
use crate::protocol::FileData;

/// A chunked upload cannot be reassembled while a slot is still empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleError {
    pub index: usize,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing chunk at index {}", self.index)
    }
}

impl std::error::Error for AssembleError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub index: i64,
    pub total: usize,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk index {} out of range (0..{})", self.index, self.total)
    }
}

impl std::error::Error for OutOfRange {}

/// Validate a client-supplied `totalChunks` against the configured ceiling.
pub fn validate_total_chunks(total: Option<i64>, max: u32) -> Result<usize, String> {
    match total {
        None => Err("totalChunks is required".to_owned()),
        Some(n) if n < 1 => Err(format!("totalChunks must be at least 1, got {n}")),
        Some(n) if n > i64::from(max) => Err(format!("totalChunks {n} exceeds limit of {max}")),
        Some(n) => usize::try_from(n).map_err(|_| format!("totalChunks {n} is too large")),
    }
}

/// One file being reassembled.
#[derive(Debug)]
pub struct UploadSession {
    pub file_id: String,
    /// Metadata from `file_start`; `data` is filled in at completion.
    pub file_data: FileData,
    pub room_id: String,
    pub person_id: String,
    pub person_name: String,
    pub owner: ConnHandle,
    pub created_at: Instant,
    pub last_activity: Instant,
    chunks: Vec<Option<String>>,
    filled: usize,
}

impl UploadSession {
    pub fn new(
        file_id: String,
        total_chunks: usize,
        file_data: FileData,
        room_id: String,
        person_id: String,
        person_name: String,
        owner: ConnHandle,
    ) -> Self {
        let now = Instant::now();
        Self {
            file_id,
            file_data,
            room_id,
            person_id,
            person_name,
            owner,
            created_at: now,
            last_activity: now,
            chunks: vec![None; total_chunks],
            filled: 0,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Percentage of filled slots, rounded to the nearest integer.
    pub fn progress(&self) -> u8 {
        if self.chunks.is_empty() {
            return 0;
        }
        let pct = (self.filled as f64 / self.chunks.len() as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Store `data` at `index` and return the new progress.
    ///
    /// Re-sending a slot replaces its contents without counting it twice.
    pub fn put_chunk(&mut self, index: i64, data: String) -> Result<u8, OutOfRange> {
        let total = self.chunks.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.chunks.get_mut(i))
            .ok_or(OutOfRange { index, total })?;
        if slot.is_none() {
            self.filled += 1;
        }
        *slot = Some(data);
        self.last_activity = Instant::now();
        Ok(self.progress())
    }

    pub fn first_missing(&self) -> Option<usize> {
        self.chunks.iter().position(Option::is_none)
    }

    /// Concatenate all chunks by slot index.
    pub fn assemble(&self) -> Result<String, AssembleError> {
        if let Some(index) = self.first_missing() {
            return Err(AssembleError { index });
        }
        let len = self.chunks.iter().flatten().map(String::len).sum();
        let mut payload = String::with_capacity(len);
        for chunk in self.chunks.iter().flatten() {
            payload.push_str(chunk);
        }
        Ok(payload)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Time since `file_start`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// File id -> in-flight session. At most one session per file id.
#[derive(Debug, Default)]
pub struct UploadStore {
    sessions: HashMap<String, UploadSession>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. A file id that is already in flight is
    /// rejected and the existing session is left untouched.
    pub fn start(&mut self, session: UploadSession) -> Result<(), UploadSession> {
        if self.sessions.contains_key(&session.file_id) {
            return Err(session);
        }
        self.sessions.insert(session.file_id.clone(), session);
        Ok(())
    }

    pub fn get_mut(&mut self, file_id: &str) -> Option<&mut UploadSession> {
        self.sessions.get_mut(file_id)
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.sessions.contains_key(file_id)
    }

    pub fn remove(&mut self, file_id: &str) -> Option<UploadSession> {
        self.sessions.remove(file_id)
    }

    /// Remove every session owned by `person_id` or opened on `conn`.
    pub fn remove_owned(&mut self, person_id: Option<&str>, conn: ConnId) -> Vec<String> {
        let doomed: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.owner.id() == conn || person_id.is_some_and(|p| s.person_id == p))
            .map(|s| s.file_id.clone())
            .collect();
        for file_id in &doomed {
            self.sessions.remove(file_id);
        }
        doomed
    }

    /// Remove and return sessions idle for longer than `max_idle`.
    pub fn reap_idle(&mut self, now: Instant, max_idle: Duration) -> Vec<UploadSession> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.idle_for(now) > max_idle)
            .map(|s| s.file_id.clone())
            .collect();
        expired.iter().filter_map(|id| self.sessions.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
