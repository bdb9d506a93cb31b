use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::{ensure_reason_string_allowed, DisconnectReasonCode};
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which side of the connection sent the DISCONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectOrigin {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectPacket {
    pub origin: DisconnectOrigin,
    pub reason_code: DisconnectReasonCode,
    pub reason_string: Option<String>,
    pub session_expiry_interval: Option<u32>,
    pub server_reference: Option<String>,
    pub user_properties: UserProperties,
}

impl DisconnectPacket {
    pub fn new(origin: DisconnectOrigin, reason_code: DisconnectReasonCode) -> Self {
        Self {
            origin,
            reason_code,
            reason_string: None,
            session_expiry_interval: None,
            server_reference: None,
            user_properties: UserProperties::default(),
        }
    }
}

/// DISCONNECT as seen by an interceptor. Unlike acknowledgements the reason
/// code may change class, but it must stay valid for the sending side.
#[derive(Debug)]
pub struct ModifiableDisconnectPacket {
    packet: DisconnectPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableDisconnectPacket {
    pub fn origin(&self) -> DisconnectOrigin {
        self.packet.origin
    }

    pub fn reason_code(&self) -> DisconnectReasonCode {
        self.packet.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: DisconnectReasonCode) -> PacketResult<()> {
        let allowed = match self.packet.origin {
            DisconnectOrigin::Client => reason_code.can_be_sent_by_client(),
            DisconnectOrigin::Server => reason_code.can_be_sent_by_server(),
        };
        if !allowed {
            return Err(PacketError::argument(format!(
                "reason code {reason_code:?} must not be sent by the {:?}",
                self.packet.origin
            )));
        }
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

    pub fn session_expiry_interval(&self) -> Option<u32> {
        self.packet.session_expiry_interval
    }

    /// Only a client may carry a session expiry interval on DISCONNECT.
    pub fn set_session_expiry_interval(&mut self, interval: u32) -> PacketResult<()> {
        if self.packet.origin == DisconnectOrigin::Server {
            return Err(PacketError::Unsupported(
                "session expiry interval is not sent on a server DISCONNECT".into(),
            ));
        }
        self.limits.check_session_expiry(interval)?;
        self.modified |=
            replace_if_changed(&mut self.packet.session_expiry_interval, Some(interval));
        Ok(())
    }

    pub fn server_reference(&self) -> Option<&str> {
        self.packet.server_reference.as_deref()
    }

    pub fn set_server_reference(&mut self, reference: Option<&str>) -> PacketResult<()> {
        if reference.is_some() && self.packet.origin == DisconnectOrigin::Client {
            return Err(PacketError::Unsupported(
                "server reference is not sent on a client DISCONNECT".into(),
            ));
        }
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

impl ModifiablePacket for ModifiableDisconnectPacket {
    type Snapshot = DisconnectPacket;

    fn from_snapshot(packet: &DisconnectPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> DisconnectPacket {
        DisconnectPacket {
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

    #[test]
    fn test_client_disconnect_reason_codes() {
        let packet = DisconnectPacket::new(
            DisconnectOrigin::Client,
            DisconnectReasonCode::NormalDisconnection,
        );
        let mut disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, Arc::default());
        assert!(disconnect
            .set_reason_code(DisconnectReasonCode::ServerShuttingDown)
            .is_err());
        disconnect
            .set_reason_code(DisconnectReasonCode::DisconnectWithWillMessage)
            .unwrap();
        assert!(disconnect.set_server_reference(Some("other")).is_err());
        assert!(disconnect.is_modified());
    }

    #[test]
    fn test_session_expiry_bounded_by_configuration() {
        let packet = DisconnectPacket::new(
            DisconnectOrigin::Client,
            DisconnectReasonCode::NormalDisconnection,
        );
        let limits = Arc::new(PacketLimits {
            max_session_expiry_interval: 60,
            ..Default::default()
        });
        let mut disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, limits);
        assert!(disconnect.set_session_expiry_interval(61).is_err());
        disconnect.set_session_expiry_interval(60).unwrap();
        assert_eq!(disconnect.copy().session_expiry_interval, Some(60));
    }

    #[test]
    fn test_server_disconnect_rejects_will_code() {
        let packet = DisconnectPacket::new(
            DisconnectOrigin::Server,
            DisconnectReasonCode::ServerShuttingDown,
        );
        let mut disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, Arc::default());
        assert!(disconnect
            .set_reason_code(DisconnectReasonCode::DisconnectWithWillMessage)
            .is_err());
        assert!(disconnect.set_session_expiry_interval(10).is_err());
        disconnect.set_server_reference(Some("other:1883")).unwrap();
    }

    #[test]
    fn test_disconnect_copy_round_trip() {
        let mut packet = DisconnectPacket::new(
            DisconnectOrigin::Client,
            DisconnectReasonCode::DisconnectWithWillMessage,
        );
        packet.reason_string = Some("bye".into());
        packet.session_expiry_interval = Some(120);
        let disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, Arc::default());
        assert!(!disconnect.is_modified());
        assert_eq!(disconnect.copy(), packet);
    }

    #[test]
    fn test_setting_current_disconnect_code_is_noop() {
        let packet = DisconnectPacket::new(
            DisconnectOrigin::Server,
            DisconnectReasonCode::ServerShuttingDown,
        );
        let mut disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, Arc::default());
        disconnect
            .set_reason_code(DisconnectReasonCode::ServerShuttingDown)
            .unwrap();
        assert!(!disconnect.is_modified());
    }

    #[test]
    fn test_normal_disconnection_rejected_while_reason_string_set() {
        let mut packet = DisconnectPacket::new(
            DisconnectOrigin::Client,
            DisconnectReasonCode::DisconnectWithWillMessage,
        );
        packet.reason_string = Some("bye".into());
        let mut disconnect = ModifiableDisconnectPacket::from_snapshot(&packet, Arc::default());
        assert!(matches!(
            disconnect.set_reason_code(DisconnectReasonCode::NormalDisconnection),
            Err(PacketError::InvalidState(_))
        ));
        assert!(!disconnect.is_modified());
    }
}
