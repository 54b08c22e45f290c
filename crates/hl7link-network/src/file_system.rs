//! Directory polling interface.
//!
//! Every `scan_interval` the configured directory is listed; each file with
//! the configured extension is read, split into framed messages, dispatched,
//! and renamed to `<file>.processed` so it is not picked up again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hl7link_core::constants::{DEFAULT_SCAN_INTERVAL_SECS, PROCESSED_SUFFIX};
use hl7link_protocol::{Message, split_framed_text};

use crate::error::InterfaceError;
use crate::interface::{Hl7Interface, InterfaceCore, InterfaceSettings, sleep_or_cancel};

#[derive(Debug, Clone)]
pub struct FileSystemConfig {
    pub directory: PathBuf,

    /// File extension to pick up, without the leading dot
    pub extension: String,

    pub scan_interval: Duration,

    pub settings: InterfaceSettings,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            extension: "hl7".to_string(),
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
            settings: InterfaceSettings::default(),
        }
    }
}

/// File-system polling interface.
#[derive(Debug, Clone)]
pub struct FileSystemInterface {
    inner: Arc<FileSystemInner>,
}

#[derive(Debug)]
struct FileSystemInner {
    core: InterfaceCore,
    config: FileSystemConfig,
}

impl FileSystemInterface {
    pub fn new(name: impl Into<String>, config: FileSystemConfig) -> Self {
        let core = InterfaceCore::new(name, config.settings.clone());
        Self {
            inner: Arc::new(FileSystemInner { core, config }),
        }
    }

    pub fn config(&self) -> &FileSystemConfig {
        &self.inner.config
    }

    /// Run one scan now. Returns the number of messages dispatched.
    ///
    /// Per-file failures are reported on the error stream and do not stop
    /// the scan.
    ///
    /// # Errors
    ///
    /// [`InterfaceError::FileSystem`] when the directory cannot be listed.
    pub async fn scan_once(&self) -> Result<usize, InterfaceError> {
        self.inner.scan().await
    }
}

impl Hl7Interface for FileSystemInterface {
    fn core(&self) -> &InterfaceCore {
        &self.inner.core
    }

    fn on_start(&self) -> Result<(), InterfaceError> {
        let config = &self.inner.config;
        let extension = normalized_extension(&config.extension);

        if extension.is_empty() || !config.directory.is_dir() {
            self.inner.core.write_status(format!(
                "Unable to scan file system, '{}'",
                config.directory.display()
            ));
            return Err(InterfaceError::Config(format!(
                "'{}' is not a directory or no file extension is set",
                config.directory.display()
            )));
        }

        self.inner.core.write_status(format!(
            "File system scanning initiated at {}",
            config.directory.display()
        ));

        let inner = Arc::clone(&self.inner);
        self.inner.core.spawn_run(move |token| inner.run(token))
    }
}

impl FileSystemInner {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            if let Err(e) = self.scan().await {
                self.core.write_error(e);
            }
            if sleep_or_cancel(&token, self.config.scan_interval).await {
                break;
            }
        }
    }

    async fn scan(&self) -> Result<usize, InterfaceError> {
        let directory = &self.config.directory;
        let extension = normalized_extension(&self.config.extension);

        let mut entries = tokio::fs::read_dir(directory)
            .await
            .map_err(|source| fs_error(directory, source))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| fs_error(directory, source))?
        {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        self.core
            .write_status(format!("{} .{} files found", files.len(), extension));

        let mut dispatched = 0;
        for path in files {
            match self.process_file(&path).await {
                Ok(count) => dispatched += count,
                Err(e) => self.core.write_error(e),
            }
        }
        Ok(dispatched)
    }

    async fn process_file(&self, path: &Path) -> Result<usize, InterfaceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| fs_error(path, source))?;

        let settings = &self.config.settings;
        let mut count = 0;
        for text in split_framed_text(&content, &settings.markers) {
            let message = Message::parse_with(text, settings.delimiters);
            if message.is_empty() {
                continue;
            }
            if settings.log_messages {
                self.core.write_status(text);
            }
            self.core.write_message(message);
            count += 1;
        }

        let mut processed = path.as_os_str().to_owned();
        processed.push(PROCESSED_SUFFIX);
        tokio::fs::rename(path, &processed)
            .await
            .map_err(|source| fs_error(path, source))?;

        debug!(interface = %self.core.name(), file = %path.display(), count, "File processed");
        Ok(count)
    }
}

fn normalized_extension(extension: &str) -> &str {
    extension.trim().trim_start_matches('.')
}

fn fs_error(path: &Path, source: std::io::Error) -> InterfaceError {
    InterfaceError::FileSystem {
        path: path.to_path_buf(),
        source,
    }
}
