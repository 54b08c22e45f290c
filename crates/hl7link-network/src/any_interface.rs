use std::future::Future;

use crate::error::InterfaceError;
use crate::file_system::FileSystemInterface;
use crate::inbound::InboundSocketInterface;
use crate::interface::{Hl7Interface, InterfaceCore};
use crate::outbound::OutboundSocketInterface;

/// Any of the provided interfaces, for hosts that run a mixed set.
#[derive(Debug, Clone)]
pub enum AnyInterface {
    Inbound(InboundSocketInterface),
    Outbound(OutboundSocketInterface),
    FileSystem(FileSystemInterface),
}

impl AnyInterface {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyInterface::Inbound(_) => "inbound",
            AnyInterface::Outbound(_) => "outbound",
            AnyInterface::FileSystem(_) => "file_system",
        }
    }
}

impl Hl7Interface for AnyInterface {
    fn core(&self) -> &InterfaceCore {
        match self {
            AnyInterface::Inbound(i) => i.core(),
            AnyInterface::Outbound(i) => i.core(),
            AnyInterface::FileSystem(i) => i.core(),
        }
    }

    fn on_start(&self) -> Result<(), InterfaceError> {
        match self {
            AnyInterface::Inbound(i) => i.on_start(),
            AnyInterface::Outbound(i) => i.on_start(),
            AnyInterface::FileSystem(i) => i.on_start(),
        }
    }

    fn on_stop(&self) -> bool {
        match self {
            AnyInterface::Inbound(i) => i.on_stop(),
            AnyInterface::Outbound(i) => i.on_stop(),
            AnyInterface::FileSystem(i) => i.on_stop(),
        }
    }

    fn started(&self) -> impl Future<Output = bool> + Send {
        async move {
            match self {
                AnyInterface::Inbound(i) => i.started().await,
                AnyInterface::Outbound(i) => i.started().await,
                AnyInterface::FileSystem(i) => i.started().await,
            }
        }
    }

    fn stopped(&self) -> impl Future<Output = ()> + Send {
        self.core().join_run()
    }
}

impl From<InboundSocketInterface> for AnyInterface {
    fn from(value: InboundSocketInterface) -> Self {
        AnyInterface::Inbound(value)
    }
}

impl From<OutboundSocketInterface> for AnyInterface {
    fn from(value: OutboundSocketInterface) -> Self {
        AnyInterface::Outbound(value)
    }
}

impl From<FileSystemInterface> for AnyInterface {
    fn from(value: FileSystemInterface) -> Self {
        AnyInterface::FileSystem(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InboundConfig, OutboundConfig};

    #[tokio::test]
    async fn test_delegates_lifecycle() {
        let inbound = InboundSocketInterface::new(
            "in",
            InboundConfig {
                host: Some("127.0.0.1".to_string()),
                port: 0,
                ..InboundConfig::default()
            },
        );
        let any = AnyInterface::from(inbound.clone());

        assert_eq!(any.kind(), "inbound");
        assert_eq!(any.id(), inbound.id());
        assert!(any.start_async(true).await);
        assert!(inbound.local_addr().is_some());
        assert!(any.stop_async(true).await);
        assert!(!inbound.is_running());
    }

    #[test]
    fn test_name() {
        let any = AnyInterface::from(OutboundSocketInterface::new("out", OutboundConfig::default()));
        assert_eq!(any.name(), "out");
        assert_eq!(any.kind(), "outbound");
    }
}
