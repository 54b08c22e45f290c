//! TOML configuration for the `run` command.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [hl7]
//! send_acknowledgements = true
//! datetime_format = "%Y%m%d%H%M%S"
//!
//! [[inbound]]
//! name = "adt"
//! port = 6661
//!
//! [[outbound]]
//! name = "billing"
//! host = "10.0.0.5"
//! port = 2575
//!
//! [[file_system]]
//! name = "drop folder"
//! directory = "/var/spool/hl7"
//! extension = "hl7"
//! ```
//!
//! `[hl7]` holds the settings shared by every interface; each entry may
//! override `send_acknowledgements` and `log_messages`.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hl7link_core::constants::{
    DEFAULT_ACK_SEND_TIMEOUT_SECS, DEFAULT_BIND_RETRY_DELAY_SECS, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_IDLE_DELAY_SECS, DEFAULT_IDLE_WINDOW_SECS, DEFAULT_MAX_BIND_RETRIES,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_QUEUE_LEN, DEFAULT_MLLP_PORT,
    DEFAULT_RECEIVE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS, DEFAULT_SCAN_INTERVAL_SECS,
    DEFAULT_SEND_TIMEOUT_SECS,
};
use hl7link_network::{
    AnyInterface, FileSystemConfig, FileSystemInterface, InboundConfig, InboundSocketInterface,
    InterfaceSettings, OutboundConfig, OutboundSocketInterface,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub hl7: InterfaceSettings,
    pub inbound: Vec<InboundEntry>,
    pub outbound: Vec<OutboundEntry>,
    pub file_system: Vec<FileSystemEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Per-interface overrides of the shared `[hl7]` settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub send_acknowledgements: Option<bool>,
    pub log_messages: Option<bool>,
}

impl SettingsOverride {
    fn apply(&self, base: &InterfaceSettings) -> InterfaceSettings {
        let mut settings = base.clone();
        if let Some(send) = self.send_acknowledgements {
            settings.send_acknowledgements = send;
        }
        if let Some(log) = self.log_messages {
            settings.log_messages = log;
        }
        settings
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InboundEntry {
    pub name: String,
    pub host: Option<String>,
    pub port: u16,
    pub persist_connection: bool,
    pub idle_window_secs: u64,
    pub ack_send_timeout_secs: u64,
    pub bind_retry_delay_secs: u64,
    pub max_bind_retries: u32,
    pub max_frame_size: usize,
    #[serde(flatten)]
    pub overrides: SettingsOverride,
}

impl Default for InboundEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: None,
            port: DEFAULT_MLLP_PORT,
            persist_connection: true,
            idle_window_secs: DEFAULT_IDLE_WINDOW_SECS,
            ack_send_timeout_secs: DEFAULT_ACK_SEND_TIMEOUT_SECS,
            bind_retry_delay_secs: DEFAULT_BIND_RETRY_DELAY_SECS,
            max_bind_retries: DEFAULT_MAX_BIND_RETRIES,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            overrides: SettingsOverride::default(),
        }
    }
}

impl InboundEntry {
    pub fn to_config(&self, base: &InterfaceSettings) -> InboundConfig {
        InboundConfig {
            host: self.host.clone(),
            port: self.port,
            persist_connection: self.persist_connection,
            idle_window: Duration::from_secs(self.idle_window_secs),
            ack_send_timeout: Duration::from_secs(self.ack_send_timeout_secs),
            bind_retry_delay: Duration::from_secs(self.bind_retry_delay_secs),
            max_bind_retries: self.max_bind_retries,
            max_frame_size: self.max_frame_size,
            settings: self.overrides.apply(base),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutboundEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub send_timeout_secs: u64,
    pub receive_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub idle_delay_secs: u64,
    pub max_queue_len: usize,
    pub max_frame_size: usize,
    #[serde(flatten)]
    pub overrides: SettingsOverride,
}

impl Default for OutboundEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MLLP_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            receive_timeout_secs: DEFAULT_RECEIVE_TIMEOUT_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            idle_delay_secs: DEFAULT_IDLE_DELAY_SECS,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            overrides: SettingsOverride::default(),
        }
    }
}

impl OutboundEntry {
    pub fn to_config(&self, base: &InterfaceSettings) -> OutboundConfig {
        OutboundConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
            receive_timeout: Duration::from_secs(self.receive_timeout_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            idle_delay: Duration::from_secs(self.idle_delay_secs),
            max_queue_len: self.max_queue_len,
            max_frame_size: self.max_frame_size,
            settings: self.overrides.apply(base),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FileSystemEntry {
    pub name: String,
    pub directory: PathBuf,
    pub extension: String,
    pub scan_interval_secs: u64,
    #[serde(flatten)]
    pub overrides: SettingsOverride,
}

impl Default for FileSystemEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            directory: PathBuf::from("."),
            extension: "hl7".to_string(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            overrides: SettingsOverride::default(),
        }
    }
}

impl FileSystemEntry {
    pub fn to_config(&self, base: &InterfaceSettings) -> FileSystemConfig {
        FileSystemConfig {
            directory: self.directory.clone(),
            extension: self.extension.clone(),
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            settings: self.overrides.apply(base),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        if config.inbound.is_empty() && config.outbound.is_empty() && config.file_system.is_empty()
        {
            bail!("No interfaces configured");
        }
        Ok(config)
    }

    /// Build every configured interface, inbound first.
    pub fn interfaces(&self) -> Vec<AnyInterface> {
        let base = &self.hl7;
        let mut interfaces = Vec::new();

        for (i, entry) in self.inbound.iter().enumerate() {
            let name = display_name(&entry.name, "inbound", i);
            interfaces.push(InboundSocketInterface::new(name, entry.to_config(base)).into());
        }
        for (i, entry) in self.outbound.iter().enumerate() {
            let name = display_name(&entry.name, "outbound", i);
            interfaces.push(OutboundSocketInterface::new(name, entry.to_config(base)).into());
        }
        for (i, entry) in self.file_system.iter().enumerate() {
            let name = display_name(&entry.name, "file_system", i);
            interfaces.push(FileSystemInterface::new(name, entry.to_config(base)).into());
        }
        interfaces
    }
}

fn display_name(name: &str, kind: &str, index: usize) -> String {
    if name.trim().is_empty() {
        format!("{kind}-{}", index + 1)
    } else {
        name.to_string()
    }
}
