//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries one JSON frame per WebSocket text message.
//! [`WebSocketConnector`] opens a new one per (re)connection attempt. Both
//! `ws://` and `wss://` URLs are accepted.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tictac_cube_client::CubeError> {
//! use tictac_cube_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:5000/ws").await?;
//! ws.send(r#"{"event":"create_game","data":{"player_name":"Ann"}}"#.to_string())
//!     .await?;
//! if let Some(Ok(frame)) = ws.recv().await {
//!     println!("server said: {frame}");
//! }
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::CubeError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream, public so callers can build their own
/// and hand it to [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// `recv` is cancel-safe: a dropped `recv` future never consumes a frame.
/// Binary frames are skipped and pings are answered by tungstenite.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Io`] if the URL is invalid or the handshake
    /// fails. An underlying I/O error keeps its [`ErrorKind`](std::io::ErrorKind).
    pub async fn connect(url: &str) -> Result<Self, CubeError> {
        tracing::debug!(url = %url, "opening WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            CubeError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket open");
        Ok(Self::from_stream(stream))
    }

    /// Wrap a stream opened elsewhere (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::Timeout`] when the deadline passes first.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, CubeError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| CubeError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), CubeError> {
        if self.closed {
            return Err(CubeError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| CubeError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, CubeError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(CubeError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::trace!("WebSocket keepalive");
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping binary WebSocket frame");
                }
                Message::Frame(_) => {
                    tracing::debug!("skipping raw WebSocket frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), CubeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| CubeError::TransportSend(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] to a fixed URL on every call.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&mut self) -> Result<WebSocketTransport, CubeError> {
        WebSocketTransport::connect(&self.url).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    const GREETING: &str = r#"{"event":"connected","data":{"message":"Connected to server"}}"#;

    /// Accept one WebSocket on a local port, run `handler` on it and return the URL.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerSocket) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    async fn drain(mut ws: ServerSocket) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_traits<T: Send + std::fmt::Debug>() {}
        assert_traits::<WebSocketTransport>();
        assert_traits::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, CubeError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_on_refused_port() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, CubeError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_reports_timeout() {
        // TEST-NET-1 never answers.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CubeError::Timeout));
    }

    #[tokio::test]
    async fn recv_yields_text_frames_then_none_on_close() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(GREETING.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), GREETING);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_and_ping_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Ping(vec![9].into())).await.unwrap();
            ws.send(Message::Text(GREETING.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), GREETING);
    }

    #[tokio::test]
    async fn frames_are_sent_verbatim() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let frame = r#"{"event":"make_move","data":{"z":0,"y":1,"x":2}}"#;
        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send(frame.to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), frame);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_send() {
        let url = start_mock_server(drain).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, CubeError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_opens_a_transport_per_call() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(GREETING.into())).await.unwrap();
            drain(ws).await;
        })
        .await;

        let mut connector = WebSocketConnector::new(url.clone());
        assert_eq!(connector.url(), url);
        let mut transport = connector.connect().await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), GREETING);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn from_stream_wraps_existing_socket() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(GREETING.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(stream);
        assert_eq!(transport.recv().await.unwrap().unwrap(), GREETING);
    }
}
