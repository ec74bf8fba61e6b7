//! Transport connection boundary.
//!
//! The engine is transport-agnostic: anything that can read and write whole
//! text frames can carry a channel. Implementations live outside the core
//! (see the `sockline_ws` package for the WebSocket one).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Read/write failures at the transport layer. Any of these closes the
/// channel that owns the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("transport read failed: {0}")]
    Read(String),
    #[error("transport write failed: {0}")]
    Write(String),
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Keepalive timing negotiated for a connection, both in the dialer's
/// options and in the server's Open handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingParams {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PingParams {
    fn default() -> Self {
        // engine.io v4 defaults; the handshake header overrides per session.
        PingParams {
            interval: Duration::from_secs(25),
            timeout: Duration::from_secs(20),
        }
    }
}

/// One bidirectional frame connection.
///
/// `get_message` blocks until one whole frame is available and is only ever
/// called from the channel's single inbound loop; `write_message` is only
/// ever called from the single outbound loop. `close` must be safe to call
/// concurrently with both and must cause a pending `get_message` to return
/// an error.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Read the next raw frame.
    async fn get_message(&self) -> Result<String, TransportError>;

    /// Write one raw frame.
    async fn write_message(&self, frame: String) -> Result<(), TransportError>;

    /// Close the underlying connection. Idempotent.
    async fn close(&self);

    /// Keepalive timing configured for this connection.
    fn ping_params(&self) -> PingParams;
}
