// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use crate::protocol::ServerMessage;

/// Error codes carried on `error` and `file_error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    UnsupportedType,
    AlreadyJoined,
    NotJoined,
    RoomNotFound,
    UploadNotFound,
    UploadExists,
    InvalidUpload,
    ChunkOutOfRange,
    IncompleteUpload,
    UploadExpired,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::AlreadyJoined => "ALREADY_JOINED",
            Self::NotJoined => "NOT_JOINED",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::UploadNotFound => "UPLOAD_NOT_FOUND",
            Self::UploadExists => "UPLOAD_EXISTS",
            Self::InvalidUpload => "INVALID_UPLOAD",
            Self::ChunkOutOfRange => "CHUNK_OUT_OF_RANGE",
            Self::IncompleteUpload => "INCOMPLETE_UPLOAD",
            Self::UploadExpired => "UPLOAD_EXPIRED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Build a generic `error` frame.
    pub fn to_error(&self, message: impl Into<String>) -> ServerMessage {
        ServerMessage::Error { code: self.as_str().to_owned(), message: message.into() }
    }

    /// Build a `file_error` frame for an upload.
    pub fn to_file_error(&self, file_id: &str, message: impl Into<String>) -> ServerMessage {
        ServerMessage::FileError {
            file_id: file_id.to_owned(),
            code: self.as_str().to_owned(),
            message: message.into(),
            chunk_index: None,
        }
    }

    /// Build a `file_error` frame blaming one chunk slot.
    pub fn to_chunk_error(
        &self,
        file_id: &str,
        chunk_index: i64,
        message: impl Into<String>,
    ) -> ServerMessage {
        ServerMessage::FileError {
            file_id: file_id.to_owned(),
            code: self.as_str().to_owned(),
            message: message.into(),
            chunk_index: Some(chunk_index),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
