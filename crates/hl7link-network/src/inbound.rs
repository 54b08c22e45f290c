//! Inbound MLLP listener.
//!
//! Accepts one connection at a time, turns every frame into a [`Message`],
//! publishes it and answers with an `ACK` on the same connection.
//!
//! ```text
//! Stopped -> Starting -> Accepting -> Connected <-> Processing
//!                            ^            |
//!                            +-- Closing -+
//! ```
//!
//! # Recovery
//!
//! - Undecodable payload (not UTF-8, no segments): counted as a failure,
//!   reported, connection kept.
//! - Peer close, socket error, oversized frame, failed ack: connection closed,
//!   next connection accepted.
//! - No message within the idle window: connection recycled unless a message
//!   arrived recently.
//! - Address in use: bind retried with exponential backoff, at most
//!   `max_bind_retries` times.

use chrono::{DateTime, Local};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hl7link_core::Error as ProtocolError;
use hl7link_core::constants::{
    DEFAULT_ACK_SEND_TIMEOUT_SECS, DEFAULT_BIND_RETRY_DELAY_SECS, DEFAULT_IDLE_WINDOW_SECS,
    DEFAULT_MAX_BIND_RETRIES, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MLLP_PORT,
    MAX_BIND_RETRY_DELAY_SECS,
};
use hl7link_protocol::{Frame, Message, MllpCodec};

use crate::error::InterfaceError;
use crate::interface::{Hl7Interface, InterfaceCore, InterfaceSettings, sleep_or_cancel};

const LISTEN_BACKLOG: u32 = 32;
const CONNECTION_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Inbound listener settings.
#[derive(Debug, Clone)]
pub struct InboundConfig {
    /// Address or host name to listen on; `None` listens on every IPv4
    /// interface. Host names resolve to their first IPv4 address.
    pub host: Option<String>,

    /// Port to listen on, `0` for an ephemeral port
    pub port: u16,

    /// Keep a connection open after the first exchange
    pub persist_connection: bool,

    /// Receive timeout, and the window used to decide whether a quiet
    /// connection is recycled
    pub idle_window: Duration,

    pub ack_send_timeout: Duration,

    /// First delay after an address-in-use bind failure; doubled per retry
    pub bind_retry_delay: Duration,

    pub max_bind_retries: u32,

    pub max_frame_size: usize,

    pub settings: InterfaceSettings,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_MLLP_PORT,
            persist_connection: true,
            idle_window: Duration::from_secs(DEFAULT_IDLE_WINDOW_SECS),
            ack_send_timeout: Duration::from_secs(DEFAULT_ACK_SEND_TIMEOUT_SECS),
            bind_retry_delay: Duration::from_secs(DEFAULT_BIND_RETRY_DELAY_SECS),
            max_bind_retries: DEFAULT_MAX_BIND_RETRIES,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            settings: InterfaceSettings::default(),
        }
    }
}

/// Listener state, observable through [`InboundSocketInterface::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    Stopped,
    /// Resolving and binding (including bind retries)
    Starting,
    /// Listening, no connection
    Accepting,
    /// Connection open, waiting for a frame
    Connected,
    /// Handling a frame and sending its acknowledgement
    Processing,
    /// Connection being shut down
    Closing,
}

/// A live inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Local>,
}

#[derive(Debug)]
struct LiveConnection {
    info: ConnectionInfo,
    token: CancellationToken,
}

type MllpStream = Framed<TcpStream, MllpCodec>;

/// Inbound MLLP socket interface.
///
/// # Example
///
/// ```no_run
/// use hl7link_network::{Hl7Interface, InboundConfig, InboundSocketInterface};
///
/// # async fn example() {
/// let inbound = InboundSocketInterface::new(
///     "lab results",
///     InboundConfig {
///         port: 6661,
///         ..InboundConfig::default()
///     },
/// );
/// if inbound.start_async(false).await {
///     println!("listening on {:?}", inbound.local_addr());
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InboundSocketInterface {
    inner: Arc<InboundInner>,
}

#[derive(Debug)]
struct InboundInner {
    core: InterfaceCore,
    config: InboundConfig,
    state: watch::Sender<InboundState>,

    /// Bumped by every start and stop; a run only publishes state while its
    /// generation is current.
    generation: AtomicU64,

    local_addr: Mutex<Option<SocketAddr>>,
    connections: DashMap<u64, LiveConnection>,
    next_connection_id: AtomicU64,
}

impl InboundSocketInterface {
    pub fn new(name: impl Into<String>, config: InboundConfig) -> Self {
        let core = InterfaceCore::new(name, config.settings.clone());
        Self {
            inner: Arc::new(InboundInner {
                core,
                config,
                state: watch::channel(InboundState::Stopped).0,
                generation: AtomicU64::new(0),
                local_addr: Mutex::new(None),
                connections: DashMap::new(),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &InboundConfig {
        &self.inner.config
    }

    /// Address the listener is bound to, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn state(&self) -> InboundState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<InboundState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the live-connection registry.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner
            .connections
            .iter()
            .map(|entry| entry.value().info.clone())
            .collect()
    }

    /// Close every live connection; the listener keeps accepting.
    pub fn close_connections(&self) {
        for entry in self.inner.connections.iter() {
            entry.value().token.cancel();
        }
    }
}

impl Hl7Interface for InboundSocketInterface {
    fn core(&self) -> &InterfaceCore {
        &self.inner.core
    }

    fn on_start(&self) -> Result<(), InterfaceError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(InboundState::Starting);

        let inner = Arc::clone(&self.inner);
        self.inner
            .core
            .spawn_run(move |token| inner.run(token, generation))
            .inspect_err(|_| {
                self.inner.state.send_replace(InboundState::Stopped);
            })
    }

    fn on_stop(&self) -> bool {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.core.cancel_run();
        *self.inner.local_addr.lock() = None;
        self.inner.state.send_replace(InboundState::Stopped);
        true
    }

    /// Resolves `true` once listening, `false` if binding gave up.
    fn started(&self) -> impl Future<Output = bool> + Send {
        let mut state = self.inner.state.subscribe();
        async move {
            match state.wait_for(|s| *s != InboundState::Starting).await {
                Ok(current) => *current != InboundState::Stopped,
                Err(_) => false,
            }
        }
    }
}

impl InboundInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, generation: u64, state: InboundState) {
        if self.is_current(generation) {
            self.state.send_replace(state);
        }
    }

    /// Terminal failure: the run ends and the interface is no longer running.
    fn fail(&self, generation: u64, error: InterfaceError) {
        self.core.write_error(error);
        if self.is_current(generation) {
            self.core.set_running(false);
            self.state.send_replace(InboundState::Stopped);
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken, generation: u64) {
        let addr = match self.bind_addr().await {
            Ok(addr) => addr,
            Err(e) => return self.fail(generation, e),
        };

        let Some(listener) = self.bind_with_retry(addr, &token, generation).await else {
            return;
        };

        let local_addr = listener.local_addr().unwrap_or(addr);
        if self.is_current(generation) {
            *self.local_addr.lock() = Some(local_addr);
        }
        self.core
            .write_status(format!("Listening on port {}", local_addr.port()));
        self.set_state(generation, InboundState::Accepting);

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    self.serve(stream, peer, &token, generation).await;
                    if token.is_cancelled() {
                        break;
                    }
                    self.set_state(generation, InboundState::Accepting);
                }
                Err(e) => {
                    self.core.write_error(InterfaceError::TransientSocket {
                        peer: local_addr,
                        reason: e.to_string(),
                    });
                    if sleep_or_cancel(&token, ACCEPT_ERROR_DELAY).await {
                        break;
                    }
                }
            }
        }

        drop(listener);
        if self.is_current(generation) {
            *self.local_addr.lock() = None;
            self.state.send_replace(InboundState::Stopped);
        }
        debug!(interface = %self.core.name(), "Listener closed");
    }

    async fn bind_addr(&self) -> Result<SocketAddr, InterfaceError> {
        let port = self.config.port;
        let host = self
            .config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty());

        let Some(host) = host else {
            return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        };

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        tokio::net::lookup_host((host, port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.find(SocketAddr::is_ipv4))
            .ok_or_else(|| InterfaceError::NoLocalAddress(host.to_string()))
    }

    /// Bind `addr`, retrying address-in-use conflicts. `None` when the run
    /// should end.
    async fn bind_with_retry(
        &self,
        addr: SocketAddr,
        token: &CancellationToken,
        generation: u64,
    ) -> Option<TcpListener> {
        let max_delay = Duration::from_secs(MAX_BIND_RETRY_DELAY_SECS);
        let mut delay = self.config.bind_retry_delay;
        let mut attempts = 0u32;

        loop {
            if token.is_cancelled() {
                return None;
            }

            match bind(addr) {
                Ok(listener) => return Some(listener),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    attempts += 1;
                    self.core.write_error(InterfaceError::AddressInUse(addr));

                    if attempts > self.config.max_bind_retries {
                        self.fail(
                            generation,
                            InterfaceError::BindRetriesExhausted { addr, attempts },
                        );
                        return None;
                    }

                    self.core
                        .write_status("Socket address and port already in use.  Recycling.");
                    if sleep_or_cancel(token, delay).await {
                        return None;
                    }
                    delay = (delay * 2).min(max_delay);
                }
                Err(source) => {
                    self.fail(generation, InterfaceError::BindFailed { addr, source });
                    return None;
                }
            }
        }
    }

    async fn serve(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        token: &CancellationToken,
        generation: u64,
    ) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection_token = token.child_token();
        self.connections.insert(
            id,
            LiveConnection {
                info: ConnectionInfo {
                    id,
                    peer,
                    connected_at: Local::now(),
                },
                token: connection_token.clone(),
            },
        );

        info!(interface = %self.core.name(), %peer, "Connection accepted");
        self.set_state(generation, InboundState::Connected);
        self.core.write_status("Connection established");

        let codec = MllpCodec::with_markers(self.config.settings.markers)
            .with_max_frame_size(self.config.max_frame_size);
        let mut framed = Framed::new(stream, codec);
        let idle_window = self.config.idle_window;

        loop {
            let next = tokio::select! {
                _ = connection_token.cancelled() => break,
                next = tokio::time::timeout(idle_window, framed.next()) => next,
            };

            match next {
                Err(_) => {
                    if self.core.statistics().has_received_message(idle_window) {
                        continue;
                    }
                    self.core.write_status("Not receiving - connection recycling");
                    break;
                }
                Ok(None) => {
                    debug!(interface = %self.core.name(), %peer, "Connection closed by peer");
                    break;
                }
                Ok(Some(Err(e))) => {
                    self.core.write_error(InterfaceError::TransientSocket {
                        peer,
                        reason: e.to_string(),
                    });
                    break;
                }
                Ok(Some(Ok(frame))) => {
                    self.set_state(generation, InboundState::Processing);
                    let keep = self
                        .process_frame(&mut framed, frame, peer, &connection_token)
                        .await;
                    self.set_state(generation, InboundState::Connected);

                    if !keep || !self.config.persist_connection {
                        break;
                    }
                }
            }
        }

        self.set_state(generation, InboundState::Closing);
        let mut stream = framed.into_inner();
        if let Err(e) = tokio::time::timeout(CONNECTION_SHUTDOWN_TIMEOUT, stream.shutdown()).await
        {
            debug!(%peer, "Shutdown timeout: {}", e);
        }
        self.connections.remove(&id);
        debug!(interface = %self.core.name(), %peer, "Connection closed");
    }

    /// Handle one frame. Returns `false` when the connection must be recycled.
    ///
    /// The acknowledgement write gives up as soon as `token` is cancelled, so a
    /// peer that stopped reading cannot hold up a stop.
    async fn process_frame(
        &self,
        framed: &mut MllpStream,
        frame: Frame,
        peer: SocketAddr,
        token: &CancellationToken,
    ) -> bool {
        let settings = &self.config.settings;

        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                self.core.statistics().add_failure();
                self.core.write_error(e.into());
                return true;
            }
        };

        let message = Message::parse_with(text, settings.delimiters);
        if message.is_empty() {
            self.core.statistics().add_failure();
            self.core
                .write_error(ProtocolError::malformed("frame contains no segments").into());
            return true;
        }

        trace!(
            interface = %self.core.name(),
            %peer,
            message_type = message.message_type().unwrap_or_default(),
            control_id = message.message_control_id().unwrap_or_default(),
            "Frame received"
        );

        if settings.log_messages {
            self.core.write_status(text);
        }

        let control_id = message.message_control_id().map(str::to_owned);
        self.core.write_message(message);

        if !settings.send_acknowledgements {
            return true;
        }

        let ack = settings.ack_builder().build(control_id.as_deref());
        let sent = tokio::select! {
            _ = token.cancelled() => return false,
            sent = tokio::time::timeout(self.config.ack_send_timeout, framed.send(ack)) => sent,
        };
        match sent {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                self.core.write_error(InterfaceError::TransientSocket {
                    peer,
                    reason: e.to_string(),
                });
                false
            }
            Err(_) => {
                warn!(interface = %self.core.name(), %peer, "Acknowledgement send timed out");
                self.core.write_error(InterfaceError::TransientSocket {
                    peer,
                    reason: "timed out sending acknowledgement".to_string(),
                });
                false
            }
        }
    }
}

fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}
