// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room fan-out.

use crate::connection::{encode, ConnHandle, ConnId, Frame, SendOutcome};
use crate::protocol::ServerMessage;
use crate::registry::Registry;

/// Send `msg` to every open member of `room_id` except `exclude`.
///
/// The payload is serialized once. Each recipient is an independent,
/// non-blocking enqueue: a full or closed queue affects only that recipient.
/// Returns the number of recipients the frame was queued for.
pub fn broadcast(
    registry: &Registry,
    room_id: &str,
    msg: &ServerMessage,
    exclude: Option<ConnId>,
) -> usize {
    let members = registry.members(room_id);
    fan_out(&members, msg, exclude)
}

/// Like [`broadcast`], for a frame serialized ahead of time.
pub fn broadcast_frame(
    registry: &Registry,
    room_id: &str,
    frame: &Frame,
    exclude: Option<ConnId>,
) -> usize {
    let members = registry.members(room_id);
    fan_out_frame(&members, frame, exclude)
}

/// Fan a message out to an explicit recipient snapshot.
pub fn fan_out(members: &[ConnHandle], msg: &ServerMessage, exclude: Option<ConnId>) -> usize {
    if members.is_empty() {
        return 0;
    }
    match encode(msg) {
        Some(frame) => fan_out_frame(members, &frame, exclude),
        None => 0,
    }
}

fn fan_out_frame(members: &[ConnHandle], frame: &Frame, exclude: Option<ConnId>) -> usize {
    let mut queued = 0;
    for conn in members {
        if Some(conn.id()) == exclude || !conn.is_open() {
            continue;
        }
        if conn.send_frame(frame.clone()) == SendOutcome::Queued {
            queued += 1;
        }
    }
    queued
}
