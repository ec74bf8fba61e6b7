//! WebSocket implementation of the engine's transport contract.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sockline::{Connection, PingParams, TransportError};

const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Dial configuration: keepalive timing plus extra handshake request
/// headers (cookies, auth tokens).
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub ping: PingParams,
    pub extra_headers: Vec<(String, String)>,
}

/// Build the ws/wss endpoint URL for a host and port.
pub fn format_url(host: &str, port: u16, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}:{port}{SOCKET_IO_PATH}")
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One client WebSocket connection. Protocol frames ride on text messages;
/// ws-level control frames are consumed here and never reach the engine.
pub struct WsConnection {
    sink: Mutex<WsSink>,
    source: Mutex<WsSource>,
    cancel: CancellationToken,
    ping: PingParams,
}

impl WsConnection {
    pub async fn connect(url: &str, options: &Options) -> Result<WsConnection, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in &options.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        debug!(url, "connecting websocket transport");
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, source) = stream.split();
        Ok(WsConnection {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
            cancel: CancellationToken::new(),
            ping: options.ping,
        })
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn get_message(&self) -> Result<String, TransportError> {
        let mut source = self.source.lock().await;
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransportError::Closed),
                frame = source.next() => frame,
            };
            match frame {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.as_str().to_string()),
                Some(Ok(WsMessage::Binary(_))) => {
                    return Err(TransportError::Read("unexpected binary frame".into()));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Err(TransportError::Closed),
                // ws-level ping/pong; the library answers these itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
            }
        }
    }

    async fn write_message(&self, frame: String) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&self) {
        // Unblock any pending read first: a peer that never answers the
        // close handshake must not keep the inbound loop alive.
        self.cancel.cancel();
        let _ = self.sink.lock().await.close().await;
    }

    fn ping_params(&self) -> PingParams {
        self.ping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_plain_and_secure_urls() {
        assert_eq!(
            format_url("localhost", 3811, false),
            "ws://localhost:3811/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            format_url("example.com", 443, true),
            "wss://example.com:443/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn default_options_use_engine_ping_params() {
        let options = Options::default();
        assert_eq!(options.ping, PingParams::default());
        assert!(options.extra_headers.is_empty());
    }
}
