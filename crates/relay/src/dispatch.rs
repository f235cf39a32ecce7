// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound frame dispatch: the only code that mutates the registry, typing
//! tracker, and upload store, and the only caller of [`broadcast`].
//!
//! A connection starts `Unbound`, becomes `Joined` on its first successful
//! join, and is `Closed` once [`handle_disconnect`] has run. There is no leave
//! frame. A bad frame earns an error reply and never closes the connection.

use indexmap::IndexSet;
use tracing::{debug, error, info, warn};

use crate::broadcast::{broadcast, broadcast_frame};
use crate::connection::{encode, ConnHandle, ConnId};
use crate::error::ErrorCode;
use crate::protocol::{parse_frame, ClientMessage, FileData, ServerMessage};
use crate::registry::{JoinOutcome, LeaveOutcome};
use crate::state::{epoch_ms, Hub, RelayState};
use crate::upload::{validate_total_chunks, UploadSession};

/// Identity bound by the last successful join on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub room_id: String,
    pub person_name: String,
    pub person_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unbound,
    Joined,
    Closed,
}

/// Per-connection protocol context.
#[derive(Debug)]
pub struct ConnContext {
    handle: ConnHandle,
    identity: Option<Identity>,
    /// Every room this connection is registered in.
    rooms: IndexSet<String>,
    closed: bool,
}

impl ConnContext {
    pub fn new(handle: ConnHandle) -> Self {
        Self { handle, identity: None, rooms: IndexSet::new(), closed: false }
    }

    pub fn id(&self) -> ConnId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ConnHandle {
        &self.handle
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    pub fn state(&self) -> ConnState {
        if self.closed {
            ConnState::Closed
        } else if self.identity.is_some() {
            ConnState::Joined
        } else {
            ConnState::Unbound
        }
    }

    fn reply(&self, msg: &ServerMessage) {
        self.handle.send(msg);
    }
}

/// Parse and dispatch one inbound text frame.
pub async fn handle_frame(state: &RelayState, ctx: &mut ConnContext, text: &str) {
    if ctx.closed {
        return;
    }
    match parse_frame(text) {
        Ok(msg) => dispatch(state, ctx, msg).await,
        Err(e) => {
            warn!(conn = %ctx.id(), err = ?e, "rejected inbound frame");
            ctx.reply(&e.to_reply());
        }
    }
}

/// Dispatch one parsed message.
pub async fn dispatch(state: &RelayState, ctx: &mut ConnContext, msg: ClientMessage) {
    if ctx.closed {
        return;
    }
    match msg {
        ClientMessage::Ping {} => ctx.reply(&ServerMessage::Pong {}),

        ClientMessage::Join { room_id, person_name, person_id } => {
            handle_join(state, ctx, Identity { room_id, person_name, person_id }).await
        }

        ClientMessage::Chat { message, room_id, person_name, person_id } => {
            if message.is_empty() {
                return;
            }
            let hub = &mut *state.hub.lock().await;
            if !hub.registry.has_room(&room_id) {
                debug!(%room_id, %person_id, "chat to empty room dropped");
                return;
            }
            // Sending a message ends the sender's typing indicator first.
            if hub.typing.stop(&room_id, &person_id) {
                let stop = ServerMessage::TypingStop {
                    room_id: room_id.clone(),
                    person_name: person_name.clone(),
                    person_id: person_id.clone(),
                };
                broadcast(&hub.registry, &room_id, &stop, Some(ctx.id()));
            }
            debug!(%room_id, %person_id, len = message.len(), "chat");
            let chat = ServerMessage::Chat {
                message,
                room_id: room_id.clone(),
                person_name,
                person_id,
                timestamp: epoch_ms(),
            };
            broadcast(&hub.registry, &room_id, &chat, None);
        }

        ClientMessage::TypingStart { room_id, person_name, person_id } => {
            let hub = &mut *state.hub.lock().await;
            if !hub.registry.has_room(&room_id) {
                return;
            }
            if hub.typing.start(&room_id, &person_id) {
                debug!(%room_id, %person_id, "typing started");
            }
            let msg = ServerMessage::TypingStart { room_id: room_id.clone(), person_name, person_id };
            broadcast(&hub.registry, &room_id, &msg, Some(ctx.id()));
        }

        ClientMessage::TypingStop { room_id, person_name, person_id } => {
            let hub = &mut *state.hub.lock().await;
            if !hub.typing.stop(&room_id, &person_id) {
                return;
            }
            debug!(%room_id, %person_id, "typing stopped");
            let msg = ServerMessage::TypingStop { room_id: room_id.clone(), person_name, person_id };
            broadcast(&hub.registry, &room_id, &msg, Some(ctx.id()));
        }

        ClientMessage::FileMessage { file_data } => handle_file_message(state, ctx, file_data).await,

        ClientMessage::FileStart { file_id, file_data, room_id } => {
            handle_file_start(state, ctx, file_id, file_data, room_id).await
        }

        ClientMessage::FileChunk { file_id, chunk_index, data } => {
            let hub = &mut *state.hub.lock().await;
            let Some(session) = hub.uploads.get_mut(&file_id) else {
                ctx.reply(&ErrorCode::UploadNotFound.to_file_error(&file_id, "Upload session not found"));
                return;
            };
            match session.put_chunk(chunk_index, data) {
                Ok(progress) => {
                    debug!(
                        %file_id,
                        chunk = chunk_index,
                        total = session.total_chunks(),
                        progress,
                        "upload chunk stored"
                    );
                    ctx.reply(&ServerMessage::FileProgress { file_id, progress });
                }
                Err(e) => {
                    warn!(%file_id, err = %e, "upload chunk rejected");
                    ctx.reply(&ErrorCode::ChunkOutOfRange.to_chunk_error(
                        &file_id,
                        e.index,
                        e.to_string(),
                    ));
                }
            }
        }

        ClientMessage::FileComplete { file_id } => handle_file_complete(state, ctx, file_id).await,
    }
}

async fn handle_join(state: &RelayState, ctx: &mut ConnContext, next: Identity) {
    if ctx.identity.as_ref().is_some_and(|cur| {
        cur.room_id == next.room_id && cur.person_id == next.person_id
    }) {
        warn!(room_id = %next.room_id, person_id = %next.person_id, "duplicate join");
        ctx.reply(&ErrorCode::AlreadyJoined.to_error("Already joined this room"));
        return;
    }

    let hub = &mut *state.hub.lock().await;
    if let Some(prev) = ctx.identity.take() {
        stop_typing(hub, &prev, ctx.id());
    }

    let outcome = hub.registry.join(&next.room_id, &ctx.handle);
    let room_id = next.room_id.clone();
    let person_name = next.person_name.clone();
    ctx.identity = Some(next);

    match outcome {
        JoinOutcome::Joined => {
            ctx.rooms.insert(room_id.clone());
            info!(
                conn = %ctx.id(),
                %room_id,
                person = %person_name,
                members = hub.registry.member_count(&room_id),
                "joined room"
            );
            ctx.reply(&ServerMessage::Info { message: format!("You joined {room_id}") });
            let notice = ServerMessage::Info { message: format!("{person_name} has joined the room.") };
            broadcast(&hub.registry, &room_id, &notice, Some(ctx.id()));
        }
        JoinOutcome::AlreadyMember => {
            debug!(conn = %ctx.id(), %room_id, "identity rebound within room");
            ctx.reply(&ErrorCode::AlreadyJoined.to_error("Already a member of this room"));
        }
    }
}

async fn handle_file_message(state: &RelayState, ctx: &mut ConnContext, file_data: FileData) {
    let Some(identity) = ctx.identity.clone() else {
        ctx.reply(&ErrorCode::NotJoined.to_error("Not joined to any room"));
        return;
    };
    let name = file_data.name.clone().unwrap_or_default();
    // Serialized before locking: the payload may be large.
    let msg = ServerMessage::FileMessage {
        room_id: identity.room_id.clone(),
        person_name: identity.person_name,
        person_id: identity.person_id.clone(),
        timestamp: epoch_ms(),
        file_data,
    };
    let Some(frame) = encode(&msg) else {
        ctx.reply(&ErrorCode::Internal.to_error("Failed to relay file"));
        return;
    };

    let hub = state.hub.lock().await;
    if !hub.registry.has_room(&identity.room_id) {
        ctx.reply(&ErrorCode::RoomNotFound.to_error("Room not found"));
        return;
    }
    info!(room_id = %identity.room_id, person_id = %identity.person_id, %name, "file message");
    broadcast_frame(&hub.registry, &identity.room_id, &frame, None);
}

async fn handle_file_start(
    state: &RelayState,
    ctx: &mut ConnContext,
    file_id: String,
    file_data: FileData,
    room_id: Option<String>,
) {
    let Some(identity) = ctx.identity.clone() else {
        ctx.reply(&ErrorCode::NotJoined.to_error("Not joined to any room"));
        return;
    };
    let room_id = room_id.filter(|r| !r.is_empty()).unwrap_or_else(|| identity.room_id.clone());
    if !ctx.rooms.contains(&room_id) {
        ctx.reply(&ErrorCode::NotJoined.to_file_error(&file_id, format!("Not joined to {room_id}")));
        return;
    }
    let total = match validate_total_chunks(file_data.total_chunks, state.config.max_chunks) {
        Ok(n) => n,
        Err(reason) => {
            warn!(%file_id, %reason, "upload start rejected");
            ctx.reply(&ErrorCode::InvalidUpload.to_file_error(&file_id, reason));
            return;
        }
    };

    let metadata = FileData { data: None, is_base64: None, ..file_data };
    let session = UploadSession::new(
        file_id.clone(),
        total,
        metadata,
        room_id,
        identity.person_id,
        identity.person_name,
        ctx.handle.clone(),
    );

    let mut hub = state.hub.lock().await;
    if hub.uploads.start(session).is_err() {
        warn!(%file_id, "upload start rejected: file id already in flight");
        ctx.reply(&ErrorCode::UploadExists.to_file_error(&file_id, "Upload already in progress"));
        return;
    }
    info!(%file_id, total_chunks = total, conn = %ctx.id(), "upload started");
    ctx.reply(&ServerMessage::FileProgress { file_id, progress: 0 });
}

async fn handle_file_complete(state: &RelayState, ctx: &mut ConnContext, file_id: String) {
    // Completion always ends the session, whether or not it succeeds.
    let Some(session) = state.hub.lock().await.uploads.remove(&file_id) else {
        ctx.reply(&ErrorCode::UploadNotFound.to_file_error(&file_id, "Upload session not found"));
        return;
    };

    // Reassembly and serialization run without the hub lock.
    let payload = match session.assemble() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%file_id, index = e.index, "upload incomplete, session discarded");
            let index = i64::try_from(e.index).unwrap_or(i64::MAX);
            ctx.reply(&ErrorCode::IncompleteUpload.to_chunk_error(&file_id, index, e.to_string()));
            return;
        }
    };
    let total_chunks = session.total_chunks();
    let room_id = session.room_id;
    let person_id = session.person_id;
    let msg = ServerMessage::FileMessage {
        room_id: room_id.clone(),
        person_name: session.person_name,
        person_id: person_id.clone(),
        timestamp: epoch_ms(),
        file_data: FileData { data: Some(payload), is_base64: Some(true), ..session.file_data },
    };
    let Some(frame) = encode(&msg) else {
        error!(%file_id, "failed to complete upload");
        ctx.reply(&ErrorCode::Internal.to_file_error(&file_id, "Failed to complete file upload"));
        return;
    };

    let hub = state.hub.lock().await;
    let delivered = broadcast_frame(&hub.registry, &room_id, &frame, None);
    drop(hub);
    info!(%file_id, %room_id, %person_id, chunks = total_chunks, delivered, "upload completed");
    ctx.reply(&ServerMessage::FileComplete { file_id });
}

/// Clear a typing mark and tell the rest of its room.
fn stop_typing(hub: &mut Hub, who: &Identity, exclude: ConnId) {
    if hub.typing.stop(&who.room_id, &who.person_id) {
        let msg = ServerMessage::TypingStop {
            room_id: who.room_id.clone(),
            person_name: who.person_name.clone(),
            person_id: who.person_id.clone(),
        };
        broadcast(&hub.registry, &who.room_id, &msg, Some(exclude));
    }
}

/// Tear down a closing connection.
///
/// Room membership, the typing mark, and owned uploads are cleaned up
/// independently; a missing room does not skip the later steps.
pub async fn handle_disconnect(state: &RelayState, ctx: &mut ConnContext) {
    if ctx.closed {
        return;
    }
    ctx.closed = true;
    let conn = ctx.id();
    let hub = &mut *state.hub.lock().await;

    for room_id in ctx.rooms.drain(..) {
        match hub.registry.leave(&room_id, conn) {
            LeaveOutcome::RoomClosed => {
                let purged = hub.typing.clear_room(&room_id);
                debug!(%room_id, purged, "room closed");
            }
            LeaveOutcome::Left { remaining } => debug!(%room_id, remaining, "left room"),
            LeaveOutcome::NotMember => debug!(%room_id, %conn, "not registered at disconnect"),
        }
    }

    if let Some(identity) = &ctx.identity {
        stop_typing(hub, identity, conn);
    }

    let person_id = ctx.identity.as_ref().map(|i| i.person_id.as_str());
    for file_id in hub.uploads.remove_owned(person_id, conn) {
        info!(%file_id, %conn, "discarded incomplete upload on disconnect");
    }

    match &ctx.identity {
        Some(id) => info!(%conn, room_id = %id.room_id, person = %id.person_name, "disconnected"),
        None => debug!(%conn, "disconnected before joining"),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
