// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Roomrelay: real-time room relay for chat, typing presence, and chunked
//! file transfer over WebSocket.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod reaper;
pub mod registry;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod typing;
pub mod upload;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::reaper::spawn_upload_reaper;
use crate::state::RelayState;
use crate::transport::build_router;

/// Run the relay server until Ctrl-C.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = config.listen_addr();
    let shutdown = CancellationToken::new();
    let state = Arc::new(RelayState::new(config, shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("roomrelay listening on {}", listener.local_addr()?);
    serve(listener, state).await
}

/// Serve the relay on an already-bound listener until the state's shutdown
/// token is cancelled.
pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let reaper = spawn_upload_reaper(Arc::clone(&state));
    let router = build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;
    shutdown.cancel();
    let _ = reaper.await;
    Ok(())
}
