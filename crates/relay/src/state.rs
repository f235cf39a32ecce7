// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::registry::Registry;
use crate::typing::TypingTracker;
use crate::upload::UploadStore;

/// Shared relay state passed to all handlers via axum `State` extractor.
pub struct RelayState {
    /// Rooms, typing marks, and uploads behind one lock so that joins,
    /// leaves, and chunk writes are serialized with the broadcasts they cause.
    pub hub: Mutex<Hub>,
    pub config: RelayConfig,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(config: RelayConfig, shutdown: CancellationToken) -> Self {
        Self { hub: Mutex::new(Hub::default()), config, shutdown }
    }

    pub async fn stats(&self) -> HubStats {
        let hub = self.hub.lock().await;
        HubStats {
            rooms: hub.registry.room_count(),
            connections: hub.registry.connection_count(),
            uploads: hub.uploads.len(),
        }
    }
}

/// The three stores the dispatcher mutates.
#[derive(Debug, Default)]
pub struct Hub {
    pub registry: Registry,
    pub typing: TypingTracker,
    pub uploads: UploadStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub connections: usize,
    pub uploads: usize,
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
