//! Shared helpers for network integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hl7link_network::{InboundConfig, InterfaceError, StatusEvent};
use hl7link_protocol::{AcknowledgementBuilder, Frame, Message, MllpCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn adt_a01_text(control_id: &str) -> String {
    format!(
        "MSH|^~\\&|SENDER|FAC|RECV|FAC2|20240315143000||ADT^A01|{control_id}|P|2.3\r\
         EVN|A01|20240315143000\r\
         PID|1||12345^^^HOSP||DOE^JOHN"
    )
}

pub fn adt_a01(control_id: &str) -> Message {
    Message::parse(&adt_a01_text(control_id))
}

/// Inbound config listening on an ephemeral loopback port.
pub fn loopback_inbound() -> InboundConfig {
    InboundConfig {
        host: Some("127.0.0.1".to_string()),
        port: 0,
        ..InboundConfig::default()
    }
}

/// Next item from `rx`, failing the test after [`WAIT`].
pub async fn recv<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Next error, failing the test after [`WAIT`].
pub async fn recv_error(rx: &mut broadcast::Receiver<Arc<InterfaceError>>) -> Arc<InterfaceError> {
    recv(rx).await
}

/// Skip status lines until `text` arrives.
pub async fn wait_for_status(rx: &mut broadcast::Receiver<StatusEvent>, text: &str) {
    loop {
        if recv(rx).await.text == text {
            return;
        }
    }
}

pub async fn connect(addr: std::net::SocketAddr) -> Framed<TcpStream, MllpCodec> {
    let stream = TcpStream::connect(addr).await.expect("connect failed");
    Framed::new(stream, MllpCodec::new())
}

/// Next frame as a message, failing the test after [`WAIT`].
pub async fn next_message(framed: &mut Framed<TcpStream, MllpCodec>) -> Message {
    let frame = tokio::time::timeout(WAIT, framed.next())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed")
        .expect("decode failed");
    Message::parse(frame.to_text().expect("frame is not UTF-8"))
}

pub fn assert_ack_for(message: &Message, control_id: &str) {
    assert_eq!(message.message_type(), Some("ACK"));
    let msa = message.find_segment("MSA").expect("ack has no MSA segment");
    assert_eq!(msa.field(1), Some("AA"));
    assert_eq!(msa.field(2), Some(control_id));
}


/// MLLP endpoint that answers every frame with `ack_code` and reports the
/// control IDs it received.
pub async fn spawn_ack_server(
    ack_code: &'static str,
) -> (std::net::SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, MllpCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    let message = Message::parse(frame.to_text().unwrap());
                    let control_id = message.message_control_id().unwrap_or_default().to_string();

                    let mut ack = AcknowledgementBuilder::new().build(Some(&control_id));
                    if let Some(msa) = ack.find_segment_mut("MSA") {
                        msa.set_field(1, ack_code);
                    }
                    let _ = tx.send(control_id);
                    if framed.send(Frame::from_message(&ack)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}
