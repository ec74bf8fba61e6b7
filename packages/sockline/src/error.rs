use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Frame-level decode failures. Any of these is fatal to the channel that
/// read the frame: there is no partial-frame recovery or resynchronization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown message tag {0:?}")]
    UnknownTag(char),
    #[error("missing ack id")]
    MissingAckId,
    #[error("malformed ack id: {0}")]
    BadAckId(String),
    #[error("malformed message body: {0}")]
    BadBody(String),
}

/// Engine-level errors. The doc comment on each variant states whether it
/// tears down the channel or stays local to one message (see `channel`).
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed wire frame. Closes the channel with this as the cause.
    #[error("bad frame: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport read/write failure. Closes the channel.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed Open handshake payload. Closes the channel.
    #[error("malformed handshake header: {0}")]
    WrongHeader(String),

    /// Outbound queue reached the hard limit. Closes the channel.
    #[error("outbound queue overflow")]
    Overflow,

    /// Operation attempted on a channel that already closed.
    #[error("channel is closed")]
    NotAlive,

    /// No ack reply arrived before the deadline. The waiter is removed.
    #[error("no ack reply within {0:?}")]
    AckTimeout(Duration),

    /// Argument or reply payload failed to (de)serialize. Local to the
    /// operation that produced it; never tears down the channel.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Handler registration rejected synchronously.
    #[error("invalid registration: {0}")]
    Registration(String),
}
