// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frames for the relay protocol.
//!
//! Every frame is one JSON object with a `type` discriminator. Variant names
//! are snake_case and field names are camelCase (`roomId`, `personId`, ...),
//! which is what browser clients already speak.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { room_id: String, person_name: String, person_id: String },
    #[serde(rename_all = "camelCase")]
    Chat {
        #[serde(default)]
        message: String,
        room_id: String,
        #[serde(default)]
        person_name: String,
        person_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStart {
        room_id: String,
        #[serde(default)]
        person_name: String,
        person_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStop {
        room_id: String,
        #[serde(default)]
        person_name: String,
        person_id: String,
    },
    Ping {},
    #[serde(rename_all = "camelCase")]
    FileMessage { file_data: FileData },
    #[serde(rename_all = "camelCase")]
    FileStart {
        file_id: String,
        file_data: FileData,
        #[serde(default)]
        room_id: Option<String>,
    },
    /// `chunkIndex` is signed so that negative indices reach the bounds check
    /// instead of failing as a malformed frame.
    #[serde(rename_all = "camelCase")]
    FileChunk { file_id: String, chunk_index: i64, data: String },
    #[serde(rename_all = "camelCase")]
    FileComplete { file_id: String },
}

/// Inbound `type` values the relay understands.
pub const CLIENT_TYPES: &[&str] = &[
    "join",
    "chat",
    "typing_start",
    "typing_stop",
    "ping",
    "file_message",
    "file_start",
    "file_chunk",
    "file_complete",
];

/// File metadata, and for complete files the base64 payload.
///
/// Keys the relay does not interpret are kept in `extra` and forwarded
/// untouched; absent keys stay absent on the way out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_base64: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Info {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        message: String,
        room_id: String,
        person_name: String,
        person_id: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    TypingStart {
        room_id: String,
        person_name: String,
        person_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStop {
        room_id: String,
        person_name: String,
        person_id: String,
    },
    Pong {},
    #[serde(rename_all = "camelCase")]
    FileMessage {
        room_id: String,
        person_name: String,
        person_id: String,
        timestamp: u64,
        file_data: FileData,
    },
    #[serde(rename_all = "camelCase")]
    FileProgress {
        file_id: String,
        progress: u8,
    },
    #[serde(rename_all = "camelCase")]
    FileComplete {
        file_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FileError {
        file_id: String,
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_index: Option<i64>,
    },
}

/// Why an inbound frame could not be turned into a [`ClientMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not a JSON object.
    Malformed,
    /// Missing or unrecognised `type`.
    Unsupported(Option<String>),
    /// Known `type`, but the fields did not validate.
    Invalid(String),
}

impl FrameError {
    /// The `error` frame sent back to the client.
    pub fn to_reply(&self) -> ServerMessage {
        match self {
            Self::Malformed => ErrorCode::BadRequest.to_error("Invalid JSON format"),
            Self::Unsupported(_) => ErrorCode::UnsupportedType.to_error("Unsupported message type"),
            Self::Invalid(kind) => ErrorCode::BadRequest.to_error(format!("Invalid {kind} message")),
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_frame(text: &str) -> Result<ClientMessage, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| FrameError::Malformed)?;
    if !value.is_object() {
        return Err(FrameError::Malformed);
    }

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(k) if CLIENT_TYPES.contains(&k) => k.to_owned(),
        Some(k) => return Err(FrameError::Unsupported(Some(k.to_owned()))),
        None => return Err(FrameError::Unsupported(None)),
    };

    serde_json::from_value(value).map_err(|_| FrameError::Invalid(kind))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
