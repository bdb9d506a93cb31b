use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::{ensure_reason_string_allowed, ensure_same_class, AuthReasonCode};
use super::validation::{PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthPacket {
    pub reason_code: AuthReasonCode,
    pub authentication_method: String,
    pub authentication_data: Option<Bytes>,
    pub reason_string: Option<String>,
    pub user_properties: UserProperties,
}

impl AuthPacket {
    pub fn new(reason_code: AuthReasonCode, authentication_method: impl Into<String>) -> Self {
        Self {
            reason_code,
            authentication_method: authentication_method.into(),
            authentication_data: None,
            reason_string: None,
            user_properties: UserProperties::default(),
        }
    }
}

/// AUTH as seen by an interceptor. The authentication method is fixed for
/// the lifetime of an exchange.
#[derive(Debug)]
pub struct ModifiableAuthPacket {
    packet: AuthPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableAuthPacket {
    pub fn authentication_method(&self) -> &str {
        &self.packet.authentication_method
    }

    pub fn reason_code(&self) -> AuthReasonCode {
        self.packet.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: AuthReasonCode) -> PacketResult<()> {
        ensure_same_class(self.packet.reason_code, reason_code)?;
        ensure_reason_string_allowed(reason_code, self.packet.reason_string.as_deref())?;
        self.modified |= replace_if_changed(&mut self.packet.reason_code, reason_code);
        Ok(())
    }

    pub fn authentication_data(&self) -> Option<&Bytes> {
        self.packet.authentication_data.as_ref()
    }

    pub fn set_authentication_data(&mut self, data: Option<Bytes>) {
        self.modified |= replace_if_changed(&mut self.packet.authentication_data, data);
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

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl ModifiablePacket for ModifiableAuthPacket {
    type Snapshot = AuthPacket;

    fn from_snapshot(packet: &AuthPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> AuthPacket {
        AuthPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
