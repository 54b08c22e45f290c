use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the socket and file-system interfaces.
///
/// Most of these never reach a caller directly: the interfaces publish them
/// on their error stream and keep running. Use [`InterfaceError::kind`] to
/// tell recoverable conditions apart.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// Grammar or framing error (malformed frame, oversized frame, bad reference)
    #[error(transparent)]
    Protocol(#[from] hl7link_core::Error),

    /// Socket failure on an accepted connection; the connection is recycled
    #[error("Socket error with {peer}: {reason}")]
    TransientSocket { peer: SocketAddr, reason: String },

    /// Listener address already bound by someone else
    #[error("Socket address and port already in use: {0}")]
    AddressInUse(SocketAddr),

    /// Bind conflict persisted through every retry
    #[error("Could not bind {addr} after {attempts} attempts")]
    BindRetriesExhausted { addr: SocketAddr, attempts: u32 },

    /// Bind failed for a reason other than a conflict
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Configured host has no IPv4 address to listen on
    #[error("No IPv4 address found for host '{0}'")]
    NoLocalAddress(String),

    /// One delivery attempt failed; the message stays queued
    #[error("Failure Sending HL7 Message to {host}:{port}: {reason}")]
    DeliveryFailed {
        host: String,
        port: u16,
        reason: String,
    },

    /// First delivery failure since the endpoint last accepted a message
    #[error("Failure connecting to HL7 Endpoint {host}:{port}")]
    ConnectivityFailed { host: String, port: u16 },

    /// Outbound queue is at capacity
    #[error("Outbound queue is full ({0} messages)")]
    QueueFull(usize),

    /// File could not be read or renamed
    #[error("File system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Interface configuration cannot be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `start` was called outside a Tokio runtime
    #[error("No Tokio runtime available to run the interface")]
    NoRuntime,
}

/// Error categories and how the interfaces recover from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Frame could not be decoded; the connection is kept.
    MalformedFrame,
    /// Connection-level failure; the connection is recycled.
    TransientSocket,
    /// Listener could not bind; restarted after a delay, up to a limit.
    ListenerBindConflict,
    /// Outbound send or acknowledgement failed; the message stays queued.
    DeliveryFailure,
    /// A segment reference did not belong to the message.
    InvalidReference,
    /// Anything else (configuration, runtime, file system).
    Other,
}

impl InterfaceError {
    pub fn kind(&self) -> ErrorKind {
        use hl7link_core::Error as Core;

        match self {
            InterfaceError::Protocol(Core::MalformedFrame { .. }) => ErrorKind::MalformedFrame,
            InterfaceError::Protocol(Core::InvalidReference { .. }) => ErrorKind::InvalidReference,
            InterfaceError::Protocol(Core::FrameTooLarge { .. } | Core::Io(_))
            | InterfaceError::TransientSocket { .. } => ErrorKind::TransientSocket,
            InterfaceError::AddressInUse(_) | InterfaceError::BindRetriesExhausted { .. } => {
                ErrorKind::ListenerBindConflict
            }
            InterfaceError::DeliveryFailed { .. }
            | InterfaceError::ConnectivityFailed { .. }
            | InterfaceError::QueueFull(_) => ErrorKind::DeliveryFailure,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let addr: SocketAddr = "127.0.0.1:2575".parse().unwrap();

        assert_eq!(
            InterfaceError::from(hl7link_core::Error::malformed("bad")).kind(),
            ErrorKind::MalformedFrame
        );
        assert_eq!(
            InterfaceError::from(hl7link_core::Error::InvalidReference { name: "PID".into() })
                .kind(),
            ErrorKind::InvalidReference
        );
        assert_eq!(
            InterfaceError::AddressInUse(addr).kind(),
            ErrorKind::ListenerBindConflict
        );
        assert_eq!(
            InterfaceError::ConnectivityFailed {
                host: "h".into(),
                port: 1
            }
            .kind(),
            ErrorKind::DeliveryFailure
        );
        assert_eq!(InterfaceError::NoRuntime.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_messages() {
        let err = InterfaceError::ConnectivityFailed {
            host: "10.0.0.5".into(),
            port: 2575,
        };
        assert_eq!(
            err.to_string(),
            "Failure connecting to HL7 Endpoint 10.0.0.5:2575"
        );
    }
}
