// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handler: one reader loop and one writer task per connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{ConnHandle, ConnId, Frame};
use crate::dispatch::{handle_disconnect, handle_frame, ConnContext};
use crate::error::ErrorCode;
use crate::state::RelayState;

/// `GET /ws`: WebSocket upgrade for a relay client.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = state.config.max_frame_bytes;
    ws.max_message_size(max).on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<RelayState>, socket: WebSocket) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (handle, rx) = ConnHandle::channel(state.config.outbound_queue);
    let conn = handle.id();
    let cancel = state.shutdown.child_token();

    let writer =
        tokio::spawn(write_loop(ws_tx, rx, state.config.send_timeout(), cancel.clone(), conn));

    let mut ctx = ConnContext::new(handle);
    debug!(%conn, "connection opened");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        debug!(%conn, err = %e, "socket read failed");
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => handle_frame(&state, &mut ctx, text.as_str()).await,
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_frame(&state, &mut ctx, text).await,
                        Err(_) => {
                            ctx.handle()
                                .send(&ErrorCode::BadRequest.to_error("Binary frames must be UTF-8 JSON"));
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    handle_disconnect(&state, &mut ctx).await;
    drop(ctx);
    cancel.cancel();
    let _ = writer.await;
}

/// Drain the outbound queue into the socket.
///
/// Each write is bounded by `send_timeout`; a slow or failed write ends the
/// connection. Frames already queued are flushed before honouring `cancel`.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    send_timeout: Duration,
    cancel: CancellationToken,
    conn: ConnId,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        match tokio::time::timeout(send_timeout, ws_tx.send(Message::Text(frame)))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%conn, err = %e, "socket write failed");
                break;
            }
            Err(_) => {
                warn!(%conn, timeout_ms = send_timeout.as_millis() as u64, "socket write timed out");
                break;
            }
        }
    }

    // Stop the reader too if the writer gave up first.
    cancel.cancel();
    let _ = tokio::time::timeout(send_timeout, ws_tx.close()).await;
}
