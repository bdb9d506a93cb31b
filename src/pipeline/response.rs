//! Acknowledgement the protocol engine owes a client whose PUBLISH was
//! prevented by an extension.

use crate::interceptor::Prevention;
use crate::packets::{
    AckReasonCode, ProtocolVersion, PubackPacket, PublishPacket, PubrecPacket, Qos, ReasonCode,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PreventedPublishResponse {
    /// QoS 0 publishes are dropped silently.
    None,
    Puback(PubackPacket),
    Pubrec(PubrecPacket),
    /// MQTT 3 cannot carry a failure code, so the client is disconnected.
    Disconnect,
}

pub fn prevented_publish_response(
    protocol: ProtocolVersion,
    publish: &PublishPacket,
    prevention: &Prevention,
) -> PreventedPublishResponse {
    let reason_code = prevention.reason_code.unwrap_or(AckReasonCode::SUCCESS);
    if !protocol.is_v5() && !reason_code.is_success() {
        return PreventedPublishResponse::Disconnect;
    }
    let (reason_code, reason_string) = if protocol.is_v5() {
        (reason_code, prevention.reason_string.clone())
    } else {
        (AckReasonCode::SUCCESS, None)
    };
    match publish.qos {
        Qos::AtMostOnce => PreventedPublishResponse::None,
        Qos::AtLeastOnce => PreventedPublishResponse::Puback(
            PubackPacket::new(publish.packet_id, reason_code).with_reason_string(reason_string),
        ),
        Qos::ExactlyOnce => PreventedPublishResponse::Pubrec(
            PubrecPacket::new(publish.packet_id, reason_code).with_reason_string(reason_string),
        ),
    }
}
