//! `hl7link` command-line host.
//!
//! Usage:
//!   hl7link run --config hl7link.toml
//!   hl7link send --host 10.0.0.5 --port 2575 batch1.hl7 batch2.hl7

mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hl7link_core::constants::DEFAULT_MLLP_PORT;
use hl7link_network::{AnyInterface, Hl7Interface, OutboundConfig, OutboundSocketInterface};
use hl7link_protocol::{FrameMarkers, split_framed_text};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "hl7link")]
#[command(about = "HL7 v2 interface engine over MLLP")]
#[command(version)]
struct Cli {
    /// Log filter (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start every interface in the configuration file and run until Ctrl-C
    Run {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Deliver the messages in FILES to an MLLP endpoint
    Send {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_MLLP_PORT)]
        port: u16,

        /// Give up when the queue has not drained after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,

        /// Files holding one or more messages, framed or plain
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let app = AppConfig::from_file(&config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(&app.logging.level));
            info!("Configuration: {}", config.display());
            run(app).await
        }
        Command::Send {
            host,
            port,
            timeout_secs,
            files,
        } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            send(host, port, Duration::from_secs(timeout_secs), files).await
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(app: AppConfig) -> Result<()> {
    let interfaces = app.interfaces();
    info!("Starting {} interfaces", interfaces.len());

    for interface in &interfaces {
        spawn_message_log(interface);
        if !interface.start_async(false).await {
            warn!(interface = %interface.name(), kind = interface.kind(), "Interface did not start");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received shutdown signal");

    for interface in &interfaces {
        interface.stop_async(false).await;
        match serde_json::to_string(&interface.statistics().snapshot()) {
            Ok(stats) => info!(interface = %interface.name(), %stats, "Final statistics"),
            Err(e) => warn!("Failed to serialize statistics: {}", e),
        }
    }
    Ok(())
}

/// Log every message an interface publishes.
fn spawn_message_log(interface: &AnyInterface) {
    let name = interface.name().to_string();
    let mut messages = interface.events().subscribe_messages();

    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(message) => info!(
                    interface = %name,
                    message_type = message.message_type().unwrap_or_default(),
                    control_id = message.message_control_id().unwrap_or_default(),
                    "Message"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(interface = %name, skipped, "Message log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn send(host: String, port: u16, timeout: Duration, files: Vec<PathBuf>) -> Result<()> {
    let outbound = OutboundSocketInterface::new(
        "send",
        OutboundConfig {
            host,
            port,
            ..OutboundConfig::default()
        },
    );

    let markers = FrameMarkers::default();
    for path in &files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for text in split_framed_text(&content, &markers) {
            outbound.enqueue_text(text)?;
        }
    }

    let total = outbound.queue_len();
    info!("Sending {} messages", total);
    outbound.start_async(false).await;

    let drained = tokio::time::timeout(timeout, async {
        while outbound.queue_len() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;

    outbound.stop_async(true).await;

    if drained.is_err() {
        let left = outbound.queue_len();
        error!("{} of {} messages not delivered", left, total);
        bail!("Timed out with {left} messages undelivered");
    }

    info!("Delivered {} messages", total);
    Ok(())
}
