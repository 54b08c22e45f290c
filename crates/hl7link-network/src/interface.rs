//! Lifecycle contract shared by every interface.
//!
//! An interface owns one background task (its "run") and reports what it does
//! on three broadcast streams:
//!
//! - **messages**: every message received (inbound, file system) or delivered
//!   (outbound)
//! - **status**: human-readable progress lines, also logged at `info`
//! - **errors**: [`InterfaceError`]s, also logged at `warn`
//!
//! Implementors provide [`Hl7Interface::core`] and [`Hl7Interface::on_start`];
//! `start`/`stop` and their async variants come for free.
//!
//! # Example
//!
//! ```no_run
//! use hl7link_network::{Hl7Interface, InboundConfig, InboundSocketInterface};
//!
//! # async fn example() {
//! let inbound = InboundSocketInterface::new("ADT feed", InboundConfig::default());
//! let mut messages = inbound.events().subscribe_messages();
//!
//! assert!(inbound.start_async(false).await);
//! while let Ok(message) = messages.recv().await {
//!     println!("{:?}", message.message_type());
//! }
//! inbound.stop_async(false).await;
//! # }
//! ```

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hl7link_core::constants::{DEFAULT_ACK_VERSION, DEFAULT_DATETIME_FORMAT, EVENT_CHANNEL_CAPACITY};
use hl7link_core::InterfaceStatistics;
use hl7link_protocol::{AcknowledgementBuilder, Delimiters, FrameMarkers, Message};

use crate::error::InterfaceError;

/// Settings common to every interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    /// Reply to each received message with an `ACK`
    pub send_acknowledgements: bool,

    /// Echo every received message on the status stream
    pub log_messages: bool,

    pub markers: FrameMarkers,

    pub delimiters: Delimiters,

    /// `chrono` strftime format for generated timestamps
    pub datetime_format: String,

    /// MSH-12 of generated acknowledgements
    pub ack_version: String,
}

impl InterfaceSettings {
    /// Acknowledgement builder configured from these settings.
    pub fn ack_builder(&self) -> AcknowledgementBuilder {
        AcknowledgementBuilder::new()
            .datetime_format(self.datetime_format.clone())
            .version(self.ack_version.clone())
            .delimiters(self.delimiters)
    }
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            send_acknowledgements: true,
            log_messages: false,
            markers: FrameMarkers::default(),
            delimiters: Delimiters::default(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            ack_version: DEFAULT_ACK_VERSION.to_string(),
        }
    }
}

/// One line on the status stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub text: String,
    pub at: DateTime<Local>,
}

/// Error stream item. Shared because `InterfaceError` is not `Clone`.
pub type ErrorEvent = Arc<InterfaceError>;

/// The three notification streams of an interface.
///
/// Streams are independent; ordering is guaranteed within each stream only.
/// Subscribers that fall more than the channel capacity behind observe
/// `RecvError::Lagged` and skip ahead.
#[derive(Debug)]
pub struct InterfaceEvents {
    messages: broadcast::Sender<Message>,
    status: broadcast::Sender<StatusEvent>,
    errors: broadcast::Sender<ErrorEvent>,
}

impl InterfaceEvents {
    pub fn new() -> Self {
        Self {
            messages: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            status: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            errors: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<Message> {
        self.messages.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors.subscribe()
    }
}

impl Default for InterfaceEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the background task of a started interface.
#[derive(Debug)]
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State every interface carries: identity, settings, running flag,
/// statistics, event streams and the current run.
#[derive(Debug)]
pub struct InterfaceCore {
    id: Uuid,
    name: String,
    settings: InterfaceSettings,
    running: AtomicBool,
    statistics: Arc<InterfaceStatistics>,
    events: InterfaceEvents,
    run: Mutex<Option<RunHandle>>,
}

impl InterfaceCore {
    pub fn new(name: impl Into<String>, settings: InterfaceSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            settings,
            running: AtomicBool::new(false),
            statistics: Arc::new(InterfaceStatistics::new()),
            events: InterfaceEvents::new(),
            run: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &InterfaceSettings {
        &self.settings
    }

    pub fn statistics(&self) -> &Arc<InterfaceStatistics> {
        &self.statistics
    }

    pub fn events(&self) -> &InterfaceEvents {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Publish a status line.
    pub fn write_status(&self, text: impl Into<String>) {
        let text = text.into();
        info!(interface = %self.name, "{}", text);
        let _ = self.events.status.send(StatusEvent {
            text,
            at: Local::now(),
        });
    }

    /// Publish an error.
    pub fn write_error(&self, error: InterfaceError) {
        warn!(interface = %self.name, kind = ?error.kind(), error = %error, "Interface error");
        let _ = self.events.errors.send(Arc::new(error));
    }

    /// Count `message` as a success for its type and publish it.
    pub fn write_message(&self, message: Message) {
        self.statistics
            .add_success(message.message_type().unwrap_or_default());
        debug!(
            interface = %self.name,
            message_type = message.message_type().unwrap_or_default(),
            control_id = message.message_control_id().unwrap_or_default(),
            "Message processed"
        );
        let _ = self.events.messages.send(message);
    }

    /// Spawn `worker` as this interface's run, replacing (and cancelling) any
    /// previous one.
    ///
    /// # Errors
    ///
    /// Returns [`InterfaceError::NoRuntime`] when called outside a Tokio
    /// runtime.
    pub fn spawn_run<F, Fut>(&self, worker: F) -> Result<(), InterfaceError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| InterfaceError::NoRuntime)?;
        let cancel = CancellationToken::new();
        let task = handle.spawn(worker(cancel.clone()));

        if let Some(previous) = self.run.lock().replace(RunHandle { cancel, task }) {
            previous.cancel.cancel();
        }
        Ok(())
    }

    /// Signal the current run to finish.
    pub fn cancel_run(&self) {
        if let Some(run) = self.run.lock().as_ref() {
            run.cancel.cancel();
        }
    }

    /// Wait for the current run to finish, if there is one.
    pub async fn join_run(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            if let Err(e) = run.task.await {
                warn!(interface = %self.name, error = %e, "Interface task ended abnormally");
            }
        }
    }
}

/// Start/stop contract of an HL7 interface.
///
/// Methods returning futures are native async trait methods; the trait is not
/// object safe, use [`AnyInterface`](crate::AnyInterface) to hold mixed
/// interfaces.
pub trait Hl7Interface: Send + Sync {
    fn core(&self) -> &InterfaceCore;

    /// Launch the interface's run. `running` is already set when this is
    /// called.
    fn on_start(&self) -> Result<(), InterfaceError>;

    /// Ask the run to finish.
    fn on_stop(&self) -> bool {
        self.core().cancel_run();
        true
    }

    /// Resolves once a freshly started interface is ready to work, `false`
    /// if it gave up while starting.
    fn started(&self) -> impl Future<Output = bool> + Send {
        async { true }
    }

    /// Resolves once the run has finished.
    fn stopped(&self) -> impl Future<Output = ()> + Send {
        self.core().join_run()
    }

    fn id(&self) -> Uuid {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    fn statistics(&self) -> Arc<InterfaceStatistics> {
        Arc::clone(self.core().statistics())
    }

    fn events(&self) -> &InterfaceEvents {
        self.core().events()
    }

    /// Start (restarting if already running). Returns whether the run was
    /// launched.
    fn start(&self, quiet: bool) -> bool {
        let core = self.core();
        if !quiet {
            core.write_status("Starting");
            core.write_status(format!("LogMessages={}", core.settings().log_messages));
            core.write_status(format!(
                "SendAcknowledgements={}",
                core.settings().send_acknowledgements
            ));
        }

        self.stop(quiet);
        core.set_running(true);

        match self.on_start() {
            Ok(()) => true,
            Err(e) => {
                core.set_running(false);
                core.write_error(e);
                false
            }
        }
    }

    /// Stop. Returns `false` when the interface was not running.
    fn stop(&self, quiet: bool) -> bool {
        let core = self.core();
        if !core.is_running() {
            return false;
        }
        if !quiet {
            core.write_status("Stopping");
        }
        let stopped = self.on_stop();
        core.set_running(false);
        stopped
    }

    /// Start and wait until the interface is ready.
    fn start_async(&self, quiet: bool) -> impl Future<Output = bool> + Send {
        async move {
            if self.is_running() {
                self.stop_async(true).await;
            }
            self.start(quiet) && self.started().await
        }
    }

    /// Stop and wait for the run to finish.
    fn stop_async(&self, quiet: bool) -> impl Future<Output = bool> + Send {
        async move {
            let stopped = self.stop(quiet);
            self.stopped().await;
            stopped
        }
    }
}

/// Sleep for `duration` unless `token` fires first. Returns `true` if
/// cancelled.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Interface whose run just waits for cancellation.
    struct Idle {
        core: InterfaceCore,
        runs: Arc<AtomicUsize>,
    }

    impl Idle {
        fn new() -> Self {
            Self {
                core: InterfaceCore::new("idle", InterfaceSettings::default()),
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Hl7Interface for Idle {
        fn core(&self) -> &InterfaceCore {
            &self.core
        }

        fn on_start(&self) -> Result<(), InterfaceError> {
            let runs = Arc::clone(&self.runs);
            self.core.spawn_run(move |token| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
            })
        }
    }

    fn drain_status(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => lines.push(event.text),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_start_stop_statuses() {
        let iface = Idle::new();
        let mut status = iface.events().subscribe_status();

        assert!(iface.start_async(false).await);
        assert!(iface.is_running());
        assert!(iface.stop_async(false).await);
        assert!(!iface.is_running());

        assert_eq!(
            drain_status(&mut status),
            [
                "Starting",
                "LogMessages=false",
                "SendAcknowledgements=true",
                "Stopping"
            ]
        );
    }

    #[tokio::test]
    async fn test_quiet_start_emits_nothing() {
        let iface = Idle::new();
        let mut status = iface.events().subscribe_status();

        assert!(iface.start(true));
        assert!(iface.stop_async(true).await);
        assert!(drain_status(&mut status).is_empty());
    }

    #[tokio::test]
    async fn test_restart_reports_stopping() {
        let iface = Idle::new();
        assert!(iface.start_async(true).await);
        let mut status = iface.events().subscribe_status();

        assert!(iface.start(false));
        assert_eq!(
            drain_status(&mut status),
            [
                "Starting",
                "LogMessages=false",
                "SendAcknowledgements=true",
                "Stopping"
            ]
        );
        assert!(iface.is_running());
        assert!(iface.stop_async(true).await);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let iface = Idle::new();
        assert!(!iface.stop(false));
        assert!(!iface.stop_async(false).await);
    }

    #[tokio::test]
    async fn test_restart_replaces_run() {
        let iface = Idle::new();
        assert!(iface.start_async(true).await);
        assert!(iface.start_async(true).await);
        tokio::task::yield_now().await;
        assert!(iface.is_running());
        assert!(iface.stop_async(true).await);
        assert_eq!(iface.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let iface = Idle::new();
        let mut errors = iface.events().subscribe_errors();

        assert!(!iface.start(true));
        assert!(!iface.is_running());
        let err = errors.try_recv().unwrap();
        assert!(matches!(*err, InterfaceError::NoRuntime));
    }

    #[test]
    fn test_write_message_counts_success() {
        let core = InterfaceCore::new("x", InterfaceSettings::default());
        let mut messages = core.events().subscribe_messages();

        core.write_message(Message::parse("MSH|^~\\&|A|B|||1||ADT^A01|9"));

        assert_eq!(core.statistics().success_count("ADT^A01"), 1);
        assert_eq!(
            messages.try_recv().unwrap().message_control_id(),
            Some("9")
        );
    }

    #[test]
    fn test_ack_builder_uses_settings() {
        let settings = InterfaceSettings {
            ack_version: "2.5".to_string(),
            ..InterfaceSettings::default()
        };
        let ack = settings.ack_builder().build(Some("1"));
        assert_eq!(ack.version(), Some("2.5"));
    }

    #[test]
    fn test_ids_unique() {
        let a = InterfaceCore::new("a", InterfaceSettings::default());
        let b = InterfaceCore::new("b", InterfaceSettings::default());
        assert_ne!(a.id(), b.id());
    }
}
