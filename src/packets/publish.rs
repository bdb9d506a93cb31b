use super::properties::{ModifiableUserProperties, UserProperties};
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket, Qos};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Unspecified,
    Utf8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishPacket {
    pub packet_id: u16,
    pub qos: Qos,
    pub dup: bool,
    pub retain: bool,
    pub topic: String,
    pub payload: Bytes,
    pub message_expiry_interval: Option<u32>,
    pub payload_format: Option<PayloadFormat>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub content_type: Option<String>,
    pub subscription_identifiers: Vec<u32>,
    pub user_properties: UserProperties,
}

impl PublishPacket {
    pub fn new(topic: impl Into<String>, qos: Qos, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_id: 0,
            qos,
            dup: false,
            retain: false,
            topic: topic.into(),
            payload: payload.into(),
            message_expiry_interval: None,
            payload_format: None,
            response_topic: None,
            correlation_data: None,
            content_type: None,
            subscription_identifiers: Vec::new(),
            user_properties: UserProperties::default(),
        }
    }

    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = packet_id;
        self
    }
}

/// PUBLISH as seen by an interceptor. Packet id, DUP flag and
/// subscription identifiers are owned by the protocol engine.
#[derive(Debug)]
pub struct ModifiablePublishPacket {
    packet: PublishPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiablePublishPacket {
    pub fn packet_id(&self) -> u16 {
        self.packet.packet_id
    }

    pub fn dup(&self) -> bool {
        self.packet.dup
    }

    pub fn subscription_identifiers(&self) -> &[u32] {
        &self.packet.subscription_identifiers
    }

    pub fn topic(&self) -> &str {
        &self.packet.topic
    }

    pub fn set_topic(&mut self, topic: &str) -> PacketResult<()> {
        self.limits.check_topic(topic)?;
        self.modified |= replace_if_changed(&mut self.packet.topic, topic.to_owned());
        Ok(())
    }

    pub fn qos(&self) -> Qos {
        self.packet.qos
    }

    pub fn set_qos(&mut self, qos: Qos) -> PacketResult<()> {
        self.limits.check_qos(qos)?;
        self.modified |= replace_if_changed(&mut self.packet.qos, qos);
        Ok(())
    }

    pub fn retain(&self) -> bool {
        self.packet.retain
    }

    pub fn set_retain(&mut self, retain: bool) -> PacketResult<()> {
        if retain && !self.limits.retained_messages_enabled {
            return Err(PacketError::argument(
                "retained messages are disabled by the broker",
            ));
        }
        self.modified |= replace_if_changed(&mut self.packet.retain, retain);
        Ok(())
    }

    pub fn payload(&self) -> &Bytes {
        &self.packet.payload
    }

    pub fn set_payload(&mut self, payload: Bytes) {
        self.modified |= replace_if_changed(&mut self.packet.payload, payload);
    }

    pub fn message_expiry_interval(&self) -> Option<u32> {
        self.packet.message_expiry_interval
    }

    pub fn set_message_expiry_interval(&mut self, interval: u32) -> PacketResult<()> {
        self.limits.check_message_expiry(interval)?;
        self.modified |= replace_if_changed(&mut self.packet.message_expiry_interval, Some(interval));
        Ok(())
    }

    pub fn payload_format(&self) -> Option<PayloadFormat> {
        self.packet.payload_format
    }

    pub fn set_payload_format(&mut self, format: Option<PayloadFormat>) {
        self.modified |= replace_if_changed(&mut self.packet.payload_format, format);
    }

    pub fn response_topic(&self) -> Option<&str> {
        self.packet.response_topic.as_deref()
    }

    pub fn set_response_topic(&mut self, topic: Option<&str>) -> PacketResult<()> {
        if let Some(topic) = topic {
            self.limits.check_topic(topic)?;
        }
        self.modified |= replace_if_changed(
            &mut self.packet.response_topic,
            topic.map(str::to_owned),
        );
        Ok(())
    }

    pub fn correlation_data(&self) -> Option<&Bytes> {
        self.packet.correlation_data.as_ref()
    }

    pub fn set_correlation_data(&mut self, data: Option<Bytes>) {
        self.modified |= replace_if_changed(&mut self.packet.correlation_data, data);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.packet.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<&str>) -> PacketResult<()> {
        self.limits.check_optional_string("content type", content_type)?;
        self.modified |= replace_if_changed(
            &mut self.packet.content_type,
            content_type.map(str::to_owned),
        );
        Ok(())
    }

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl ModifiablePacket for ModifiablePublishPacket {
    type Snapshot = PublishPacket;

    fn from_snapshot(packet: &PublishPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> PublishPacket {
        PublishPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
