//! Real-time event-messaging engine with a socket.io-compatible wire
//! protocol over a pluggable transport.
//!
//! The engine is transport-agnostic: it owns the per-connection [`Channel`]
//! lifecycle (inbound/outbound/keepalive loops, backpressure teardown), ack
//! correlation for request/response exchanges, and the [`DispatchTable`]
//! routing incoming events to registered handlers. Anything implementing
//! [`Connection`] can carry a channel; the `sockline_ws` package provides
//! the WebSocket transport and client dialer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sockline::{Channel, DispatchTable};
//!
//! # async fn example(conn: Arc<dyn sockline::Connection>) -> Result<(), sockline::Error> {
//! let events = Arc::new(DispatchTable::new());
//! events.on_typed_ack::<String, _, _>("echo", |_channel, text| text)?;
//! events.set_on_connection(|channel| {
//!     println!("connected: {}", channel.id());
//! });
//!
//! let channel = Channel::new(conn, events);
//! tokio::spawn(sockline::run(channel.clone()));
//!
//! channel.emit("greet", &"hello")?;
//! let reply: String = channel
//!     .ack("echo", &"hi", Duration::from_secs(5))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod ack;
mod channel;
mod dispatch;
mod error;
mod protocol;
mod transport;

pub use ack::AckCorrelator;
pub use channel::{Channel, QUEUE_CAPACITY, run};
pub use dispatch::{DispatchTable, ON_CONNECTION, ON_DISCONNECTION, ON_ERROR};
pub use error::{Error, ProtocolError};
pub use protocol::{Header, Message, MessageKind};
pub use transport::{Connection, PingParams, TransportError};
