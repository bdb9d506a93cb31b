use super::properties::{ModifiableUserProperties, UserProperties};
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket, ProtocolVersion, Qos};
use bytes::Bytes;
use std::sync::Arc;

/// Last will carried in a CONNECT.
#[derive(Debug, Clone, PartialEq)]
pub struct WillPublish {
    pub topic: String,
    pub qos: Qos,
    pub retain: bool,
    pub payload: Bytes,
    pub will_delay_interval: u32,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub user_properties: UserProperties,
}

impl WillPublish {
    pub fn new(topic: impl Into<String>, qos: Qos, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            qos,
            retain: false,
            payload: payload.into(),
            will_delay_interval: 0,
            message_expiry_interval: None,
            content_type: None,
            user_properties: UserProperties::default(),
        }
    }

    fn validate(&self, limits: &PacketLimits) -> PacketResult<()> {
        limits.check_topic(&self.topic)?;
        limits.check_qos(self.qos)?;
        if self.retain && !limits.retained_messages_enabled {
            return Err(PacketError::argument(
                "will publish must not be retained, retained messages are disabled",
            ));
        }
        if let Some(interval) = self.message_expiry_interval {
            limits.check_message_expiry(interval)?;
        }
        limits.check_optional_string("content type", self.content_type.as_deref())?;
        for property in self.user_properties.as_slice() {
            limits.check_user_property(&property.name, &property.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub protocol_version: ProtocolVersion,
    pub clean_start: bool,
    pub session_expiry_interval: u32,
    pub keep_alive: u16,
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub topic_alias_maximum: u16,
    pub request_response_information: bool,
    pub request_problem_information: bool,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Bytes>,
    pub user_name: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<WillPublish>,
    pub user_properties: UserProperties,
}

impl ConnectPacket {
    pub fn new(client_id: impl Into<String>, protocol_version: ProtocolVersion) -> Self {
        Self {
            client_id: client_id.into(),
            protocol_version,
            clean_start: true,
            session_expiry_interval: 0,
            keep_alive: 60,
            receive_maximum: u16::MAX,
            maximum_packet_size: 268_435_460,
            topic_alias_maximum: 0,
            request_response_information: false,
            request_problem_information: true,
            authentication_method: None,
            authentication_data: None,
            user_name: None,
            password: None,
            will: None,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableConnectPacket {
    packet: ConnectPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableConnectPacket {
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.packet.protocol_version
    }

    pub fn client_id(&self) -> &str {
        &self.packet.client_id
    }

    pub fn set_client_id(&mut self, client_id: &str) -> PacketResult<()> {
        if client_id.is_empty() {
            return Err(PacketError::argument("client id must not be empty"));
        }
        if client_id.len() > self.limits.max_client_id_length {
            return Err(PacketError::argument(format!(
                "client id length must not exceed {} bytes",
                self.limits.max_client_id_length
            )));
        }
        self.limits.check_string("client id", client_id)?;
        self.modified |= replace_if_changed(&mut self.packet.client_id, client_id.to_owned());
        Ok(())
    }

    pub fn clean_start(&self) -> bool {
        self.packet.clean_start
    }

    pub fn set_clean_start(&mut self, clean_start: bool) {
        self.modified |= replace_if_changed(&mut self.packet.clean_start, clean_start);
    }

    pub fn session_expiry_interval(&self) -> u32 {
        self.packet.session_expiry_interval
    }

    pub fn set_session_expiry_interval(&mut self, interval: u32) -> PacketResult<()> {
        self.limits.check_session_expiry(interval)?;
        self.modified |= replace_if_changed(&mut self.packet.session_expiry_interval, interval);
        Ok(())
    }

    pub fn keep_alive(&self) -> u16 {
        self.packet.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> PacketResult<()> {
        if keep_alive > self.limits.max_keep_alive {
            return Err(PacketError::argument(format!(
                "keep alive {keep_alive} must not exceed the configured maximum of {}",
                self.limits.max_keep_alive
            )));
        }
        self.modified |= replace_if_changed(&mut self.packet.keep_alive, keep_alive);
        Ok(())
    }

    pub fn receive_maximum(&self) -> u16 {
        self.packet.receive_maximum
    }

    pub fn set_receive_maximum(&mut self, receive_maximum: u16) -> PacketResult<()> {
        if receive_maximum == 0 {
            return Err(PacketError::argument("receive maximum must be greater than 0"));
        }
        self.modified |= replace_if_changed(&mut self.packet.receive_maximum, receive_maximum);
        Ok(())
    }

    pub fn maximum_packet_size(&self) -> u32 {
        self.packet.maximum_packet_size
    }

    pub fn set_maximum_packet_size(&mut self, size: u32) -> PacketResult<()> {
        if size == 0 || size > self.limits.max_packet_size {
            return Err(PacketError::argument(format!(
                "maximum packet size must be between 1 and {}",
                self.limits.max_packet_size
            )));
        }
        self.modified |= replace_if_changed(&mut self.packet.maximum_packet_size, size);
        Ok(())
    }

    pub fn topic_alias_maximum(&self) -> u16 {
        self.packet.topic_alias_maximum
    }

    pub fn set_topic_alias_maximum(&mut self, maximum: u16) {
        self.modified |= replace_if_changed(&mut self.packet.topic_alias_maximum, maximum);
    }

    pub fn request_response_information(&self) -> bool {
        self.packet.request_response_information
    }

    pub fn set_request_response_information(&mut self, request: bool) {
        self.modified |=
            replace_if_changed(&mut self.packet.request_response_information, request);
    }

    pub fn request_problem_information(&self) -> bool {
        self.packet.request_problem_information
    }

    pub fn set_request_problem_information(&mut self, request: bool) {
        self.modified |= replace_if_changed(&mut self.packet.request_problem_information, request);
    }

    pub fn authentication_method(&self) -> Option<&str> {
        self.packet.authentication_method.as_deref()
    }

    /// Clearing the method also clears the authentication data.
    pub fn set_authentication_method(&mut self, method: Option<&str>) -> PacketResult<()> {
        self.limits
            .check_optional_string("authentication method", method)?;
        if method.is_none() {
            self.modified |= replace_if_changed(&mut self.packet.authentication_data, None);
        }
        self.modified |= replace_if_changed(
            &mut self.packet.authentication_method,
            method.map(str::to_owned),
        );
        Ok(())
    }

    pub fn authentication_data(&self) -> Option<&Bytes> {
        self.packet.authentication_data.as_ref()
    }

    pub fn set_authentication_data(&mut self, data: Option<Bytes>) -> PacketResult<()> {
        if data.is_some() && self.packet.authentication_method.is_none() {
            return Err(PacketError::state(
                "authentication data requires an authentication method",
            ));
        }
        self.modified |= replace_if_changed(&mut self.packet.authentication_data, data);
        Ok(())
    }

    pub fn user_name(&self) -> Option<&str> {
        self.packet.user_name.as_deref()
    }

    pub fn set_user_name(&mut self, user_name: Option<&str>) -> PacketResult<()> {
        self.limits.check_optional_string("user name", user_name)?;
        self.modified |= replace_if_changed(&mut self.packet.user_name, user_name.map(str::to_owned));
        Ok(())
    }

    pub fn password(&self) -> Option<&Bytes> {
        self.packet.password.as_ref()
    }

    pub fn set_password(&mut self, password: Option<Bytes>) {
        self.modified |= replace_if_changed(&mut self.packet.password, password);
    }

    pub fn will(&self) -> Option<&WillPublish> {
        self.packet.will.as_ref()
    }

    pub fn set_will(&mut self, will: Option<WillPublish>) -> PacketResult<()> {
        if let Some(will) = &will {
            will.validate(&self.limits)?;
        }
        self.modified |= replace_if_changed(&mut self.packet.will, will);
        Ok(())
    }

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl ModifiablePacket for ModifiableConnectPacket {
    type Snapshot = ConnectPacket;

    fn from_snapshot(packet: &ConnectPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> ConnectPacket {
        ConnectPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::UserProperty;

    fn modifiable(limits: PacketLimits) -> ModifiableConnectPacket {
        let packet = ConnectPacket::new("client-1", ProtocolVersion::V5);
        ModifiableConnectPacket::from_snapshot(&packet, Arc::new(limits))
    }

    #[test]
    fn test_client_id_rules() {
        let mut connect = modifiable(PacketLimits {
            max_client_id_length: 8,
            ..Default::default()
        });
        assert!(connect.set_client_id("").is_err());
        assert!(connect.set_client_id("much-too-long").is_err());
        connect.set_client_id("client-1").unwrap();
        assert!(!connect.is_modified());
        connect.set_client_id("client-2").unwrap();
        assert_eq!(connect.copy().client_id, "client-2");
    }

    #[test]
    fn test_keep_alive_and_receive_maximum() {
        let mut connect = modifiable(PacketLimits {
            max_keep_alive: 120,
            ..Default::default()
        });
        assert!(connect.set_keep_alive(121).is_err());
        connect.set_keep_alive(30).unwrap();
        assert!(connect.set_receive_maximum(0).is_err());
        assert_eq!(connect.keep_alive(), 30);
    }

    #[test]
    fn test_authentication_data_requires_method() {
        let mut connect = modifiable(PacketLimits::default());
        assert!(connect
            .set_authentication_data(Some(Bytes::from_static(b"x")))
            .is_err());
        connect.set_authentication_method(Some("SCRAM")).unwrap();
        connect
            .set_authentication_data(Some(Bytes::from_static(b"x")))
            .unwrap();
        connect.set_authentication_method(None).unwrap();
        assert!(connect.authentication_data().is_none());
    }

    #[test]
    fn test_will_is_validated() {
        let mut connect = modifiable(PacketLimits {
            maximum_qos: Qos::AtMostOnce,
            ..Default::default()
        });
        let will = WillPublish::new("last/will", Qos::AtLeastOnce, "bye");
        assert!(connect.set_will(Some(will)).is_err());
        assert!(connect.will().is_none());
        connect
            .set_will(Some(WillPublish::new("last/will", Qos::AtMostOnce, "bye")))
            .unwrap();
        assert!(connect.is_modified());
    }

    #[test]
    fn test_connect_copy_round_trip() {
        let mut packet = ConnectPacket::new("client-1", ProtocolVersion::V5);
        packet.clean_start = false;
        packet.session_expiry_interval = 300;
        packet.user_name = Some("alice".into());
        packet.password = Some(Bytes::from_static(b"secret"));
        packet.will = Some(WillPublish::new("last/will", Qos::AtLeastOnce, "bye"));
        packet.user_properties = UserProperties::new(vec![UserProperty::new("app", "meter")]);
        let connect = ModifiableConnectPacket::from_snapshot(&packet, Arc::default());
        assert!(!connect.is_modified());
        assert_eq!(connect.copy(), packet);
    }
}
