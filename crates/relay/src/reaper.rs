// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background eviction of upload sessions that stopped receiving chunks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::error::ErrorCode;
use crate::state::RelayState;

/// Spawn a single background task that periodically evicts idle uploads.
pub fn spawn_upload_reaper(state: Arc<RelayState>) -> JoinHandle<()> {
    let interval = state.config.reap_interval();
    let max_idle = state.config.upload_idle_timeout();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            reap_once(&state, Instant::now(), max_idle).await;
        }
    })
}

/// Evict uploads idle longer than `max_idle` as of `now` and notify their
/// owners. Returns the number evicted.
pub async fn reap_once(state: &RelayState, now: Instant, max_idle: Duration) -> usize {
    let expired = state.hub.lock().await.uploads.reap_idle(now, max_idle);

    for session in &expired {
        tracing::warn!(
            file_id = %session.file_id,
            person_id = %session.person_id,
            filled = session.filled(),
            total = session.total_chunks(),
            idle_ms = session.idle_for(now).as_millis() as u64,
            age_ms = session.age(now).as_millis() as u64,
            "evicting idle upload"
        );
        let msg = ErrorCode::UploadExpired
            .to_file_error(&session.file_id, "Upload expired after inactivity");
        session.owner.send(&msg);
    }
    expired.len()
}
