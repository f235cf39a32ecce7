// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: config, in-process clients, and assertion helpers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::connection::{ConnHandle, Frame};
use crate::dispatch::{handle_disconnect, handle_frame, ConnContext};
use crate::state::RelayState;

/// Relay config with test-friendly defaults (ephemeral port, slow reaper).
pub fn test_config() -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        log_format: "text".to_owned(),
        log_level: "debug".to_owned(),
        send_timeout_ms: 1_000,
        outbound_queue: 64,
        max_frame_bytes: 1024 * 1024,
        max_chunks: 64,
        upload_idle_timeout_ms: 60_000,
        reap_interval_ms: 60_000,
    }
}

pub fn test_state() -> Arc<RelayState> {
    Arc::new(RelayState::new(test_config(), CancellationToken::new()))
}

/// An in-process connection: drives the dispatcher directly and captures
/// every frame queued for it.
pub struct TestClient {
    pub ctx: ConnContext,
    rx: mpsc::Receiver<Frame>,
}

impl TestClient {
    pub fn new(state: &RelayState) -> Self {
        let (handle, rx) = ConnHandle::channel(state.config.outbound_queue);
        Self { ctx: ConnContext::new(handle), rx }
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, state: &RelayState, text: &str) {
        handle_frame(state, &mut self.ctx, text).await;
    }

    /// Send a JSON frame.
    pub async fn send(&mut self, state: &RelayState, frame: serde_json::Value) {
        self.send_text(state, &frame.to_string()).await;
    }

    pub async fn join(&mut self, state: &RelayState, room_id: &str, name: &str, person_id: &str) {
        self.send(
            state,
            serde_json::json!({
                "type": "join",
                "roomId": room_id,
                "personName": name,
                "personId": person_id,
            }),
        )
        .await;
    }

    pub async fn disconnect(&mut self, state: &RelayState) {
        handle_disconnect(state, &mut self.ctx).await;
    }

    /// Pop the next queued frame, if any.
    pub fn recv(&mut self) -> Option<serde_json::Value> {
        let frame = self.rx.try_recv().ok()?;
        serde_json::from_str(frame.as_str()).ok()
    }

    /// Pop every queued frame.
    pub fn drain(&mut self) -> Vec<serde_json::Value> {
        std::iter::from_fn(|| self.recv()).collect()
    }

    /// Pop every queued frame and return just their `type` fields.
    pub fn drain_types(&mut self) -> Vec<String> {
        self.drain()
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_owned())
            .collect()
    }
}

pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression returns `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
