use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::UnsubackReasonCode;
use super::subscribe::replace_reason_codes;
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
    pub user_properties: UserProperties,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, topic_filters: Vec<String>) -> Self {
        Self {
            packet_id,
            topic_filters,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableUnsubscribePacket {
    packet: UnsubscribePacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableUnsubscribePacket {
    pub fn packet_id(&self) -> u16 {
        self.packet.packet_id
    }

    pub fn topic_filters(&self) -> &[String] {
        &self.packet.topic_filters
    }

    /// Replaces the filters; the count must match the original request.
    pub fn set_topic_filters(&mut self, topic_filters: Vec<String>) -> PacketResult<()> {
        if topic_filters.len() != self.packet.topic_filters.len() {
            return Err(PacketError::argument(format!(
                "the amount of topic filters must not be changed, expected {} but was {}",
                self.packet.topic_filters.len(),
                topic_filters.len()
            )));
        }
        for filter in &topic_filters {
            self.limits.check_topic_filter(filter)?;
        }
        self.modified |= replace_if_changed(&mut self.packet.topic_filters, topic_filters);
        Ok(())
    }

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl ModifiablePacket for ModifiableUnsubscribePacket {
    type Snapshot = UnsubscribePacket;

    fn from_snapshot(packet: &UnsubscribePacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> UnsubscribePacket {
        UnsubscribePacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubackPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<UnsubackReasonCode>,
    pub reason_string: Option<String>,
    pub user_properties: UserProperties,
}

impl UnsubackPacket {
    pub fn new(packet_id: u16, reason_codes: Vec<UnsubackReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            reason_string: None,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableUnsubackPacket {
    packet: UnsubackPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableUnsubackPacket {
    pub fn packet_id(&self) -> u16 {
        self.packet.packet_id
    }

    pub fn reason_codes(&self) -> &[UnsubackReasonCode] {
        &self.packet.reason_codes
    }

    /// Count-preserving and class-preserving per index.
    pub fn set_reason_codes(&mut self, reason_codes: Vec<UnsubackReasonCode>) -> PacketResult<()> {
        replace_reason_codes(&mut self.packet.reason_codes, reason_codes)
            .map(|changed| self.modified |= changed)
    }

    pub fn reason_string(&self) -> Option<&str> {
        self.packet.reason_string.as_deref()
    }

    pub fn set_reason_string(&mut self, reason_string: Option<&str>) -> PacketResult<()> {
        self.limits.check_optional_string("reason string", reason_string)?;
        self.modified |= replace_if_changed(
            &mut self.packet.reason_string,
            reason_string.map(str::to_owned),
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

impl ModifiablePacket for ModifiableUnsubackPacket {
    type Snapshot = UnsubackPacket;

    fn from_snapshot(packet: &UnsubackPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> UnsubackPacket {
        UnsubackPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
