//! MLLP client used by the outbound interface.
//!
//! A thin transport: connect, send a framed message, read the framed reply.
//! Retry and queueing live in [`OutboundSocketInterface`](crate::OutboundSocketInterface).
//!
//! # Example
//!
//! ```no_run
//! use hl7link_network::{MllpClient, MllpClientConfig};
//! use hl7link_protocol::Message;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MllpClientConfig {
//!     host: "10.0.0.5".to_string(),
//!     port: 2575,
//!     ..MllpClientConfig::default()
//! };
//!
//! let mut client = MllpClient::new(config);
//! client.connect().await?;
//!
//! let reply = client
//!     .request(&Message::parse("MSH|^~\\&|A|B|||20240315143000||ADT^A01|1|P|2.3"))
//!     .await?;
//! println!("{}", reply);
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Timeouts
//!
//! Connect, send and receive each have their own timeout (default 10 s).
//! Timeouts are returned to the caller; the connection is left as is.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use hl7link_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MLLP_PORT,
    DEFAULT_RECEIVE_TIMEOUT_SECS, DEFAULT_SEND_TIMEOUT_SECS,
};
use hl7link_protocol::{Frame, FrameMarkers, Message, MllpCodec};

/// Connection settings for [`MllpClient`].
#[derive(Debug, Clone)]
pub struct MllpClientConfig {
    /// Host name or IP address of the endpoint
    pub host: String,

    pub port: u16,

    pub connect_timeout: Duration,

    pub send_timeout: Duration,

    pub receive_timeout: Duration,

    pub markers: FrameMarkers,

    pub max_frame_size: usize,
}

impl Default for MllpClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MLLP_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            receive_timeout: Duration::from_secs(DEFAULT_RECEIVE_TIMEOUT_SECS),
            markers: FrameMarkers::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Errors from [`MllpClient`] operations.
#[derive(Debug, Error)]
pub enum MllpClientError {
    #[error("Not connected to HL7 endpoint")]
    NotConnected,

    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Peer closed the connection mid-exchange
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] hl7link_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MllpClientError {
    /// Whether the connection must be discarded after this error.
    ///
    /// After a timeout or decode failure the stream position is unknown, so
    /// only `NotConnected` leaves nothing to discard.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, MllpClientError::NotConnected)
    }
}

/// Single-connection MLLP client.
pub struct MllpClient {
    config: MllpClientConfig,

    /// `None` while disconnected
    framed: Option<Framed<TcpStream, MllpCodec>>,
}

impl MllpClient {
    /// Create a disconnected client.
    pub fn new(config: MllpClientConfig) -> Self {
        debug!("Creating MLLP client for {}:{}", config.host, config.port);
        Self {
            config,
            framed: None,
        }
    }

    pub fn config(&self) -> &MllpClientConfig {
        &self.config
    }

    /// Connect to the configured endpoint.
    ///
    /// Name resolution and every resolved address share the connect timeout.
    ///
    /// # Errors
    ///
    /// [`MllpClientError::ConnectionTimeout`] when the deadline passes,
    /// [`MllpClientError::Io`] when resolution fails or the endpoint refuses.
    pub async fn connect(&mut self) -> Result<(), MllpClientError> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let timeout = self.config.connect_timeout;
        info!("Connecting to HL7 endpoint at {}:{}", host, port);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(stream)) => {
                info!("Connected to {}:{}", host, port);
                stream
            }
            Ok(Err(e)) => {
                error!("Connection to {}:{} failed: {}", host, port, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Connection timeout after {}ms", timeout.as_millis());
                return Err(MllpClientError::ConnectionTimeout(
                    timeout.as_millis() as u64
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let codec = MllpCodec::with_markers(self.config.markers)
            .with_max_frame_size(self.config.max_frame_size);
        self.framed = Some(Framed::new(stream, codec));
        Ok(())
    }

    /// Send one message.
    pub async fn send(&mut self, message: &Message) -> Result<(), MllpClientError> {
        trace!(
            message_type = message.message_type().unwrap_or_default(),
            control_id = message.message_control_id().unwrap_or_default(),
            "Sending message"
        );
        self.send_frame(Frame::from_message(message)).await
    }

    /// Send one raw frame payload.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), MllpClientError> {
        let timeout = self.config.send_timeout;
        let framed = self.framed.as_mut().ok_or(MllpClientError::NotConnected)?;

        match tokio::time::timeout(timeout, framed.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send frame: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!("Send timeout after {}ms", timeout.as_millis());
                Err(MllpClientError::WriteTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Wait for the next frame from the endpoint.
    pub async fn recv(&mut self) -> Result<Frame, MllpClientError> {
        let timeout = self.config.receive_timeout;
        let framed = self.framed.as_mut().ok_or(MllpClientError::NotConnected)?;

        match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => {
                trace!(size = frame.size(), "Received frame");
                Ok(frame)
            }
            Ok(Some(Err(e))) => {
                error!("Failed to decode frame: {}", e);
                Err(e.into())
            }
            Ok(None) => {
                warn!("Connection closed by endpoint");
                Err(MllpClientError::ConnectionLost(
                    "Endpoint closed connection".to_string(),
                ))
            }
            Err(_) => {
                warn!("Receive timeout after {}ms", timeout.as_millis());
                Err(MllpClientError::ReadTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Send `message` and wait for the endpoint's reply.
    pub async fn request(&mut self, message: &Message) -> Result<Frame, MllpClientError> {
        self.send(message).await?;
        self.recv().await
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Close the connection. Idempotent; flush and shutdown are each bounded
    /// to 500 ms.
    pub async fn close(&mut self) -> Result<(), MllpClientError> {
        if let Some(mut framed) = self.framed.take() {
            debug!("Closing connection to {}:{}", self.config.host, self.config.port);

            let flush_timeout = Duration::from_millis(500);
            let flushed = SinkExt::<Frame>::flush(&mut framed);
            match tokio::time::timeout(flush_timeout, flushed).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error flushing during close: {}", e),
                Err(_) => warn!("Flush timeout during close ({}ms)", flush_timeout.as_millis()),
            }

            let mut stream = framed.into_inner();
            let shutdown_timeout = Duration::from_millis(500);
            match tokio::time::timeout(shutdown_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error during shutdown: {}", e),
                Err(_) => warn!(
                    "Shutdown timeout during close ({}ms)",
                    shutdown_timeout.as_millis()
                ),
            }
        }
        Ok(())
    }
}

impl Drop for MllpClient {
    fn drop(&mut self) {
        if self.framed.is_some() {
            debug!("MllpClient dropped while connected");
        }
    }
}

impl std::fmt::Debug for MllpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MllpClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}
