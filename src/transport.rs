//! Transport abstraction for the tic-tac-cube room protocol.
//!
//! The [`Transport`] trait is a bidirectional text channel carrying one JSON
//! frame per message. Opening a transport is the job of a [`Connector`]: the
//! client calls it once at start-up and again for every reconnection attempt,
//! so a connector must be able to produce a fresh transport each time.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tictac_cube_client::error::CubeError;
//! use tictac_cube_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), CubeError> {
//!         // Send one JSON frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, CubeError>> {
//!         // Return None when the server closes the connection
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), CubeError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CubeError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame and
/// each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If it is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), CubeError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))` for a complete frame
    /// - `Some(Err(e))` on a transport error
    /// - `None` once the server has closed the connection
    async fn recv(&mut self) -> Option<Result<String, CubeError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), CubeError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: String) -> Result<(), CubeError> {
        (**self).send(message).await
    }

    async fn recv(&mut self) -> Option<Result<String, CubeError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), CubeError> {
        (**self).close().await
    }
}

/// Opens transports to the server.
///
/// The client owns its connector and calls [`connect`](Connector::connect)
/// for the first connection and for every reconnection attempt. The call is
/// wrapped in the reconnect policy's connect timeout.
#[async_trait]
pub trait Connector: Send + 'static {
    type Transport: Transport;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server could not be reached.
    async fn connect(&mut self) -> Result<Self::Transport, CubeError>;
}

/// A connector wrapping one transport that is already open.
///
/// The first call to `connect` hands the transport over. Later calls fail
/// with [`CubeError::TransportClosed`], so a client started this way gives up
/// once that connection drops.
#[derive(Debug)]
pub struct Preconnected<T> {
    transport: Option<T>,
}

impl<T: Transport> Preconnected<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
        }
    }
}

#[async_trait]
impl<T: Transport> Connector for Preconnected<T> {
    type Transport = T;

    async fn connect(&mut self) -> Result<T, CubeError> {
        self.transport.take().ok_or(CubeError::TransportClosed)
    }
}
