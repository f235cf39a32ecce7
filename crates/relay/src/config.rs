// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the room relay server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "roomrelay", version, about = "Real-time room relay for chat, typing, and files")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "RELAY_PORT")]
    pub port: u16,

    /// Log format (text or json).
    #[arg(long, default_value = "text", env = "RELAY_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[arg(long, default_value = "info", env = "RELAY_LOG_LEVEL")]
    pub log_level: String,

    /// Per-frame socket write timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "RELAY_SEND_TIMEOUT_MS")]
    pub send_timeout_ms: u64,

    /// Outbound frame queue capacity per connection.
    #[arg(long, default_value_t = 256, env = "RELAY_OUTBOUND_QUEUE")]
    pub outbound_queue: usize,

    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024, env = "RELAY_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    /// Upper bound for `totalChunks` on a chunked upload.
    #[arg(long, default_value_t = 10_000, env = "RELAY_MAX_CHUNKS")]
    pub max_chunks: u32,

    /// Evict upload sessions with no chunk activity for this long (milliseconds).
    #[arg(long, default_value_t = 300_000, env = "RELAY_UPLOAD_IDLE_TIMEOUT_MS")]
    pub upload_idle_timeout_ms: u64,

    /// Upload reaper tick interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "RELAY_REAP_INTERVAL_MS")]
    pub reap_interval_ms: u64,
}

impl RelayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            anyhow::bail!("--log-format must be text or json, got {:?}", self.log_format);
        }
        if self.send_timeout_ms == 0 {
            anyhow::bail!("--send-timeout-ms must be positive");
        }
        if self.outbound_queue == 0 {
            anyhow::bail!("--outbound-queue must be positive");
        }
        if self.max_frame_bytes == 0 {
            anyhow::bail!("--max-frame-bytes must be positive");
        }
        if self.max_chunks == 0 {
            anyhow::bail!("--max-chunks must be positive");
        }
        if self.upload_idle_timeout_ms == 0 {
            anyhow::bail!("--upload-idle-timeout-ms must be positive");
        }
        if self.reap_interval_ms == 0 {
            anyhow::bail!("--reap-interval-ms must be positive");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn upload_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
