//! Client composition: dial a server and drive a channel over WebSocket.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use sockline::{Channel, DispatchTable, Error};

use crate::connection::{Options, WsConnection};

/// A connected client: one channel over one WebSocket, with its own
/// dispatch table. Handlers registered after dial apply to messages that
/// arrive from then on.
pub struct Client {
    channel: Arc<Channel>,
    events: Arc<DispatchTable>,
}

impl Client {
    /// Connect and start the channel loops with a fresh dispatch table.
    pub async fn dial(url: &str, options: Options) -> Result<Client, Error> {
        Self::dial_with(url, options, Arc::new(DispatchTable::new())).await
    }

    /// Connect using a pre-populated dispatch table, so handlers (and the
    /// connection hook) are in place before the handshake arrives.
    pub async fn dial_with(
        url: &str,
        options: Options,
        events: Arc<DispatchTable>,
    ) -> Result<Client, Error> {
        let conn = WsConnection::connect(url, &options).await?;
        let channel = Channel::new(Arc::new(conn), events.clone());
        tokio::spawn(sockline::run(channel.clone()));
        info!(url, "client connected");
        Ok(Client { channel, events })
    }

    /// The dispatch table backing this client.
    pub fn events(&self) -> &Arc<DispatchTable> {
        &self.events
    }

    /// The underlying channel.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Session id assigned by the server's handshake.
    pub fn id(&self) -> String {
        self.channel.id()
    }

    pub fn is_alive(&self) -> bool {
        self.channel.is_alive()
    }

    pub fn on<F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        F: Fn(&Arc<Channel>) + Send + Sync + 'static,
    {
        self.events.on(method, f)
    }

    pub fn on_typed<A, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        A: DeserializeOwned,
        F: Fn(&Arc<Channel>, A) + Send + Sync + 'static,
    {
        self.events.on_typed(method, f)
    }

    pub fn on_ack<R, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        R: Serialize,
        F: Fn(&Arc<Channel>) -> R + Send + Sync + 'static,
    {
        self.events.on_ack(method, f)
    }

    pub fn on_typed_ack<A, R, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&Arc<Channel>, A) -> R + Send + Sync + 'static,
    {
        self.events.on_typed_ack(method, f)
    }

    /// Send a one-way event.
    pub fn emit<A: Serialize>(&self, method: &str, arg: &A) -> Result<(), Error> {
        self.channel.emit(method, arg)
    }

    /// Send a request and await the server's correlated reply.
    pub async fn ack<A, R>(&self, method: &str, arg: &A, deadline: Duration) -> Result<R, Error>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.channel.ack(method, arg, deadline).await
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) {
        self.channel.close(None).await;
    }
}
