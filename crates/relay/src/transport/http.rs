// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::RelayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub connections: usize,
    pub uploads: usize,
}

/// `GET /api/v1/health`: liveness and store sizes.
pub async fn health(State(s): State<Arc<RelayState>>) -> impl IntoResponse {
    let stats = s.stats().await;
    Json(HealthResponse {
        status: "running".to_owned(),
        rooms: stats.rooms,
        connections: stats.connections,
        uploads: stats.uploads,
    })
}
