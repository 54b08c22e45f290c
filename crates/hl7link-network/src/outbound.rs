//! Outbound MLLP sender.
//!
//! Messages are queued and delivered strictly in order by a single worker.
//! A message leaves the queue only when the endpoint's reply contains
//! `MSA|AA`; anything else is retried after `retry_delay`, forever.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use hl7link_core::constants::{
    ACCEPTANCE_MARKER, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_DELAY_SECS,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_QUEUE_LEN, DEFAULT_MLLP_PORT,
    DEFAULT_RECEIVE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS, DEFAULT_SEND_TIMEOUT_SECS,
};
use hl7link_protocol::Message;

use crate::client::{MllpClient, MllpClientConfig};
use crate::error::InterfaceError;
use crate::interface::{Hl7Interface, InterfaceCore, InterfaceSettings, sleep_or_cancel};

/// Outbound sender settings.
#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,

    /// Wait after a failed delivery
    pub retry_delay: Duration,

    /// Poll interval while the queue is empty
    pub idle_delay: Duration,

    pub max_queue_len: usize,
    pub max_frame_size: usize,
    pub settings: InterfaceSettings,
}

impl OutboundConfig {
    fn client_config(&self) -> MllpClientConfig {
        MllpClientConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
            markers: self.settings.markers,
            max_frame_size: self.max_frame_size,
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MLLP_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            receive_timeout: Duration::from_secs(DEFAULT_RECEIVE_TIMEOUT_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            idle_delay: Duration::from_secs(DEFAULT_IDLE_DELAY_SECS),
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            settings: InterfaceSettings::default(),
        }
    }
}

#[derive(Debug)]
struct Queued {
    seq: u64,
    message: Message,
}

/// Outbound MLLP socket interface.
///
/// # Example
///
/// ```no_run
/// use hl7link_network::{Hl7Interface, OutboundConfig, OutboundSocketInterface};
///
/// # async fn example() -> Result<(), hl7link_network::InterfaceError> {
/// let outbound = OutboundSocketInterface::new(
///     "billing",
///     OutboundConfig {
///         host: "10.0.0.5".to_string(),
///         port: 2575,
///         ..OutboundConfig::default()
///     },
/// );
/// outbound.start_async(false).await;
/// outbound.enqueue_text("MSH|^~\\&|A|B|||20240315143000||DFT^P03|42|P|2.3")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OutboundSocketInterface {
    inner: Arc<OutboundInner>,
}

#[derive(Debug)]
struct OutboundInner {
    core: InterfaceCore,
    config: OutboundConfig,
    queue: Mutex<VecDeque<Queued>>,
    next_seq: AtomicU64,
    wakeup: Notify,
}

impl OutboundSocketInterface {
    pub fn new(name: impl Into<String>, config: OutboundConfig) -> Self {
        let core = InterfaceCore::new(name, config.settings.clone());
        Self {
            inner: Arc::new(OutboundInner {
                core,
                config,
                queue: Mutex::new(VecDeque::new()),
                next_seq: AtomicU64::new(0),
                wakeup: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &OutboundConfig {
        &self.inner.config
    }

    /// Append `message` to the delivery queue.
    ///
    /// # Errors
    ///
    /// [`InterfaceError::QueueFull`] when `max_queue_len` messages are
    /// already waiting.
    pub fn enqueue(&self, message: Message) -> Result<(), InterfaceError> {
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.config.max_queue_len {
                return Err(InterfaceError::QueueFull(queue.len()));
            }
            let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
            queue.push_back(Queued { seq, message });
        }
        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Parse `text` with the configured delimiters and enqueue it.
    pub fn enqueue_text(&self, text: &str) -> Result<(), InterfaceError> {
        let message = Message::parse_with(text, self.inner.config.settings.delimiters);
        self.enqueue(message)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Message currently at the head of the queue.
    pub fn peek(&self) -> Option<Message> {
        self.inner
            .queue
            .lock()
            .front()
            .map(|queued| queued.message.clone())
    }

    /// Every queued message, head first.
    pub fn pending(&self) -> Vec<Message> {
        self.inner
            .queue
            .lock()
            .iter()
            .map(|queued| queued.message.clone())
            .collect()
    }

    /// Drop every queued message. Returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        let mut queue = self.inner.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

impl Hl7Interface for OutboundSocketInterface {
    fn core(&self) -> &InterfaceCore {
        &self.inner.core
    }

    fn on_start(&self) -> Result<(), InterfaceError> {
        let inner = Arc::clone(&self.inner);
        self.inner.core.spawn_run(move |token| inner.run(token))
    }
}

impl OutboundInner {
    fn head(&self) -> Option<(u64, Message)> {
        self.queue
            .lock()
            .front()
            .map(|queued| (queued.seq, queued.message.clone()))
    }

    /// Remove the head if it is still `seq`; the queue may have been cleared
    /// while it was in flight.
    fn pop_delivered(&self, seq: u64) {
        let mut queue = self.queue.lock();
        if queue.front().is_some_and(|queued| queued.seq == seq) {
            queue.pop_front();
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut client = MllpClient::new(self.config.client_config());
        let mut report_connectivity = true;

        loop {
            let Some((seq, message)) = self.head() else {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = self.wakeup.notified() => {}
                    _ = tokio::time::sleep(self.config.idle_delay) => {}
                }
                continue;
            };

            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                outcome = self.deliver(&mut client, &message) => outcome,
            };

            match outcome {
                Ok(()) => {
                    self.pop_delivered(seq);
                    report_connectivity = true;
                    self.core.write_message(message);
                }
                Err(reason) => {
                    self.core.statistics().add_failure();
                    self.core.write_error(InterfaceError::DeliveryFailed {
                        host: self.config.host.clone(),
                        port: self.config.port,
                        reason,
                    });
                    if report_connectivity {
                        report_connectivity = false;
                        self.core.write_error(InterfaceError::ConnectivityFailed {
                            host: self.config.host.clone(),
                            port: self.config.port,
                        });
                    }
                    if sleep_or_cancel(&token, self.config.retry_delay).await {
                        break;
                    }
                }
            }
        }

        if let Err(e) = client.close().await {
            debug!(interface = %self.core.name(), "Error closing connection: {}", e);
        }
    }

    /// One delivery attempt. I/O failures and timeouts discard the
    /// connection; a rejected message keeps it.
    async fn deliver(&self, client: &mut MllpClient, message: &Message) -> Result<(), String> {
        if !client.is_connected() {
            client.connect().await.map_err(|e| e.to_string())?;
        }

        match client.request(message).await {
            Ok(reply) if reply.contains(ACCEPTANCE_MARKER) => {
                trace!(
                    interface = %self.core.name(),
                    control_id = message.message_control_id().unwrap_or_default(),
                    "Message accepted"
                );
                Ok(())
            }
            Ok(reply) => Err(format!("message not accepted: {}", reply)),
            Err(e) => {
                if e.is_connection_error() {
                    let _ = client.close().await;
                }
                Err(e.to_string())
            }
        }
    }
}
