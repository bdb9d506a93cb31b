use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::{ensure_reason_string_allowed, ensure_same_class, ConnackReasonCode};
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnackPacket {
    pub reason_code: ConnackReasonCode,
    pub reason_string: Option<String>,
    pub session_present: bool,
    pub session_expiry_interval: Option<u32>,
    pub assigned_client_id: Option<String>,
    pub server_keep_alive: Option<u16>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
    /// Whether the matching CONNECT asked for response information.
    pub response_information_requested: bool,
    pub user_properties: UserProperties,
}

impl ConnackPacket {
    pub fn new(reason_code: ConnackReasonCode) -> Self {
        Self {
            reason_code,
            reason_string: None,
            session_present: false,
            session_expiry_interval: None,
            assigned_client_id: None,
            server_keep_alive: None,
            response_information: None,
            server_reference: None,
            response_information_requested: false,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableConnackPacket {
    packet: ConnackPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableConnackPacket {
    pub fn session_present(&self) -> bool {
        self.packet.session_present
    }

    pub fn assigned_client_id(&self) -> Option<&str> {
        self.packet.assigned_client_id.as_deref()
    }

    pub fn reason_code(&self) -> ConnackReasonCode {
        self.packet.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: ConnackReasonCode) -> PacketResult<()> {
        ensure_same_class(self.packet.reason_code, reason_code)?;
        ensure_reason_string_allowed(reason_code, self.packet.reason_string.as_deref())?;
        self.modified |= replace_if_changed(&mut self.packet.reason_code, reason_code);
        Ok(())
    }

    pub fn reason_string(&self) -> Option<&str> {
        self.packet.reason_string.as_deref()
    }

    pub fn set_reason_string(&mut self, reason_string: Option<&str>) -> PacketResult<()> {
        ensure_reason_string_allowed(self.packet.reason_code, reason_string)?;
        self.limits.check_optional_string("reason string", reason_string)?;
        self.modified |= replace_if_changed(
            &mut self.packet.reason_string,
            reason_string.map(str::to_owned),
        );
        Ok(())
    }

    pub fn response_information(&self) -> Option<&str> {
        self.packet.response_information.as_deref()
    }

    pub fn set_response_information(&mut self, information: Option<&str>) -> PacketResult<()> {
        if information.is_some() && !self.packet.response_information_requested {
            return Err(PacketError::state(
                "response information must not be set when the client did not request it",
            ));
        }
        self.limits
            .check_optional_string("response information", information)?;
        self.modified |= replace_if_changed(
            &mut self.packet.response_information,
            information.map(str::to_owned),
        );
        Ok(())
    }

    pub fn server_reference(&self) -> Option<&str> {
        self.packet.server_reference.as_deref()
    }

    pub fn set_server_reference(&mut self, reference: Option<&str>) -> PacketResult<()> {
        self.limits.check_optional_string("server reference", reference)?;
        self.modified |= replace_if_changed(
            &mut self.packet.server_reference,
            reference.map(str::to_owned),
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

impl ModifiablePacket for ModifiableConnackPacket {
    type Snapshot = ConnackPacket;

    fn from_snapshot(packet: &ConnackPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> ConnackPacket {
        ConnackPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
