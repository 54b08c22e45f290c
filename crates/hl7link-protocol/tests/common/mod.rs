//! Shared helpers for protocol integration tests.
#![allow(dead_code)]

use hl7link_protocol::{FrameMarkers, Message};

/// A minimal ADT^A01 message text with the given control ID.
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

/// `payload` wrapped with the default MLLP markers.
pub fn framed(payload: &str) -> Vec<u8> {
    FrameMarkers::default().wrap(payload.as_bytes()).to_vec()
}

/// Assert `message` is a positive acknowledgement for `control_id`.
pub fn assert_ack_for(message: &Message, control_id: &str) {
    assert_eq!(message.message_type(), Some("ACK"));
    let msa = message.find_segment("MSA").expect("ack has no MSA segment");
    assert_eq!(msa.field(1), Some("AA"));
    assert_eq!(msa.field(2), Some(control_id));
}
