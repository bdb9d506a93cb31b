//! PUBACK, PUBREC, PUBREL and PUBCOMP share one shape and differ only in
//! their reason-code set, so they are a single generic packet.

use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::{ensure_reason_string_allowed, ensure_same_class};
use super::reason::{AckReasonCode, PubrelReasonCode, ReasonCode};
use super::validation::{PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

pub trait AckKind: Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    type Reason: ReasonCode;
}

macro_rules! ack_kind {
    ($($name:ident => $reason:ty),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name;

            impl AckKind for $name {
                type Reason = $reason;
            }
        )+
    };
}

ack_kind! {
    Puback => AckReasonCode,
    Pubrec => AckReasonCode,
    Pubrel => PubrelReasonCode,
    Pubcomp => PubrelReasonCode,
}

pub type PubackPacket = AckPacket<Puback>;
pub type PubrecPacket = AckPacket<Pubrec>;
pub type PubrelPacket = AckPacket<Pubrel>;
pub type PubcompPacket = AckPacket<Pubcomp>;
pub type ModifiablePubackPacket = ModifiableAckPacket<Puback>;
pub type ModifiablePubrecPacket = ModifiableAckPacket<Pubrec>;
pub type ModifiablePubrelPacket = ModifiableAckPacket<Pubrel>;
pub type ModifiablePubcompPacket = ModifiableAckPacket<Pubcomp>;

#[derive(Debug, Clone, PartialEq)]
pub struct AckPacket<K: AckKind> {
    pub packet_id: u16,
    pub reason_code: K::Reason,
    pub reason_string: Option<String>,
    pub user_properties: UserProperties,
    kind: PhantomData<K>,
}

impl<K: AckKind> AckPacket<K> {
    pub fn new(packet_id: u16, reason_code: K::Reason) -> Self {
        Self {
            packet_id,
            reason_code,
            reason_string: None,
            user_properties: UserProperties::default(),
            kind: PhantomData,
        }
    }

    pub fn success(packet_id: u16) -> Self {
        Self::new(packet_id, K::Reason::SUCCESS)
    }

    pub fn with_reason_string(mut self, reason_string: Option<String>) -> Self {
        self.reason_string = reason_string;
        self
    }
}

#[derive(Debug)]
pub struct ModifiableAckPacket<K: AckKind> {
    packet: AckPacket<K>,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl<K: AckKind> ModifiableAckPacket<K> {
    pub fn packet_id(&self) -> u16 {
        self.packet.packet_id
    }

    pub fn reason_code(&self) -> K::Reason {
        self.packet.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: K::Reason) -> PacketResult<()> {
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

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl<K: AckKind> ModifiablePacket for ModifiableAckPacket<K> {
    type Snapshot = AckPacket<K>;

    fn from_snapshot(packet: &AckPacket<K>, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> AckPacket<K> {
        AckPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
