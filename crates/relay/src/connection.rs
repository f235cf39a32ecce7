// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handles: the non-owning reference the registry keeps for each
//! open socket.
//!
//! Each socket has exactly one writer task draining a bounded queue of
//! serialized frames, so per-recipient ordering is the order frames were
//! enqueued. Enqueueing never waits: a full queue drops the frame.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::ServerMessage;

/// A serialized outbound frame. Clones share one buffer, so every recipient
/// of a broadcast and the socket write reuse the same bytes.
pub type Frame = Utf8Bytes;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of enqueueing one frame on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full; the frame was dropped.
    Dropped,
    /// Writer is gone; the connection is no longer open.
    Closed,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    id: ConnId,
    tx: mpsc::Sender<Frame>,
}

impl ConnHandle {
    /// Create a handle with a fresh id and a queue of `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id: ConnId::next(), tx }, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue an already-serialized frame without waiting.
    pub fn send_frame(&self, frame: Frame) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn = %self.id, "outbound queue full, dropping frame");
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize and enqueue a message for this connection only.
    pub fn send(&self, msg: &ServerMessage) -> SendOutcome {
        match encode(msg) {
            Some(frame) => self.send_frame(frame),
            None => SendOutcome::Dropped,
        }
    }
}

/// Serialize a message into a shareable frame.
pub fn encode(msg: &ServerMessage) -> Option<Frame> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(Frame::from(text)),
        Err(e) => {
            tracing::error!(err = %e, "failed to serialize outbound frame");
            None
        }
    }
}
