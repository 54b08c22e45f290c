//! HL7 interfaces over MLLP sockets and the file system.
//!
//! # Components
//!
//! - [`Hl7Interface`]: start/stop contract with message, status and error
//!   streams ([`InterfaceEvents`]).
//! - [`InboundSocketInterface`]: listens for MLLP connections, acknowledges
//!   every message.
//! - [`OutboundSocketInterface`]: queues messages and delivers them in order,
//!   retrying until acknowledged.
//! - [`FileSystemInterface`]: picks up message files from a directory.
//! - [`MllpClient`]: single-connection transport used by the outbound side.
//! - [`AnyInterface`]: enum over the three interfaces.
//!
//! # Example
//!
//! ```no_run
//! use hl7link_network::{
//!     Hl7Interface, InboundConfig, InboundSocketInterface, OutboundConfig,
//!     OutboundSocketInterface,
//! };
//!
//! # async fn example() {
//! let inbound = InboundSocketInterface::new("adt in", InboundConfig::default());
//! let outbound = OutboundSocketInterface::new(
//!     "adt out",
//!     OutboundConfig {
//!         host: "10.0.0.5".to_string(),
//!         ..OutboundConfig::default()
//!     },
//! );
//!
//! inbound.start_async(false).await;
//! outbound.start_async(false).await;
//!
//! // Route everything received to the outbound endpoint.
//! let mut messages = inbound.events().subscribe_messages();
//! while let Ok(message) = messages.recv().await {
//!     if let Err(e) = outbound.enqueue(message) {
//!         eprintln!("{e}");
//!     }
//! }
//! # }
//! ```

mod any_interface;
mod client;
mod error;
mod file_system;
mod inbound;
mod interface;
mod outbound;

pub use any_interface::AnyInterface;
pub use client::{MllpClient, MllpClientConfig, MllpClientError};
pub use error::{ErrorKind, InterfaceError};
pub use file_system::{FileSystemConfig, FileSystemInterface};
pub use inbound::{ConnectionInfo, InboundConfig, InboundSocketInterface, InboundState};
pub use interface::{
    ErrorEvent, Hl7Interface, InterfaceCore, InterfaceEvents, InterfaceSettings, StatusEvent,
};
pub use outbound::{OutboundConfig, OutboundSocketInterface};
