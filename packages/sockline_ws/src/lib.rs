//! WebSocket transport and client dialer for the `sockline` engine.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sockline_ws::{Client, Options, format_url};
//!
//! # async fn example() -> Result<(), sockline::Error> {
//! let client = Client::dial(&format_url("localhost", 3811, false), Options::default()).await?;
//! client.on_typed::<String, _>("notice", |_, text| {
//!     println!("notice: {text}");
//! })?;
//! client.emit("join", &"lobby")?;
//! let motd: String = client.ack("motd", &(), Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;

pub use client::Client;
pub use connection::{Options, WsConnection, format_url};
