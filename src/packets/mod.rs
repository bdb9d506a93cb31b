//! Immutable packet snapshots and their modifiable views.
//!
//! Every MQTT control packet the pipeline intercepts has two forms: a plain
//! value type that is cheap to share behind an `Arc`, and a `Modifiable*`
//! form that an interceptor mutates during its own stage. Setters validate
//! against [`PacketLimits`] and either apply the change or leave the packet
//! untouched.

pub mod ack;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod properties;
pub mod publish;
pub mod reason;
pub mod subscribe;
pub mod unsubscribe;
pub mod validation;

pub use ack::{
    ModifiablePubackPacket, ModifiablePubcompPacket, ModifiablePubrecPacket,
    ModifiablePubrelPacket, PubackPacket, PubcompPacket, PubrecPacket, PubrelPacket,
};
pub use auth::{AuthPacket, ModifiableAuthPacket};
pub use connack::{ConnackPacket, ModifiableConnackPacket};
pub use connect::{ConnectPacket, ModifiableConnectPacket, WillPublish};
pub use disconnect::{DisconnectOrigin, DisconnectPacket, ModifiableDisconnectPacket};
pub use properties::{ModifiableUserProperties, UserProperties, UserProperty};
pub use publish::{ModifiablePublishPacket, PayloadFormat, PublishPacket};
pub use reason::{
    AckReasonCode, AuthReasonCode, ConnackReasonCode, DisconnectReasonCode, PubrelReasonCode,
    ReasonCode, SubackReasonCode, UnsubackReasonCode,
};
pub use subscribe::{
    ModifiableSubackPacket, ModifiableSubscribePacket, ModifiableSubscription,
    RetainHandling, SubackPacket, SubscribePacket, Subscription,
};
pub use unsubscribe::{
    ModifiableUnsubackPacket, ModifiableUnsubscribePacket, UnsubackPacket, UnsubscribePacket,
};
pub use validation::{PacketError, PacketLimits, PacketResult, UTF8_STRING_MAX_LENGTH};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for Qos {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(format!("invalid qos level {other}")),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        qos.level()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V3_1,
    V3_1_1,
    V5,
}

impl ProtocolVersion {
    pub fn is_v5(self) -> bool {
        self == Self::V5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketKind {
    Connect,
    Connack,
    Publish,
    Puback,
    Pubrec,
    Pubrel,
    Pubcomp,
    Subscribe,
    Suback,
    Unsubscribe,
    Unsuback,
    Disconnect,
    Auth,
}

impl PacketKind {
    pub const ALL: [PacketKind; 13] = [
        Self::Connect,
        Self::Connack,
        Self::Publish,
        Self::Puback,
        Self::Pubrec,
        Self::Pubrel,
        Self::Pubcomp,
        Self::Subscribe,
        Self::Suback,
        Self::Unsubscribe,
        Self::Unsuback,
        Self::Disconnect,
        Self::Auth,
    ];

    /// Directions in which the broker offers interception for this kind.
    pub fn directions(self) -> &'static [Direction] {
        const IN: &[Direction] = &[Direction::Inbound];
        const OUT: &[Direction] = &[Direction::Outbound];
        const BOTH: &[Direction] = &[Direction::Inbound, Direction::Outbound];
        match self {
            Self::Connect | Self::Subscribe | Self::Unsubscribe => IN,
            Self::Connack | Self::Suback | Self::Unsuback => OUT,
            Self::Publish
            | Self::Puback
            | Self::Pubrec
            | Self::Pubrel
            | Self::Pubcomp
            | Self::Disconnect
            | Self::Auth => BOTH,
        }
    }

    pub fn supports(self, direction: Direction) -> bool {
        self.directions().contains(&direction)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connack => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::Puback => "PUBACK",
            Self::Pubrec => "PUBREC",
            Self::Pubrel => "PUBREL",
            Self::Pubcomp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::Suback => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Unsuback => "UNSUBACK",
            Self::Disconnect => "DISCONNECT",
            Self::Auth => "AUTH",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-stage view over a packet snapshot.
pub trait ModifiablePacket: Debug + Send + 'static {
    type Snapshot;

    fn from_snapshot(packet: &Self::Snapshot, limits: Arc<PacketLimits>) -> Self;

    /// Immutable snapshot of the current field values.
    fn copy(&self) -> Self::Snapshot;

    /// True iff a setter actually changed a value.
    fn is_modified(&self) -> bool;
}

/// A packet snapshot the chain executor can run interceptors over.
pub trait Interceptable: Clone + Debug + PartialEq + Send + Sync + 'static {
    type Modifiable: ModifiablePacket<Snapshot = Self>;

    const KIND: PacketKind;

    fn into_packet(self) -> Packet;

    fn modifiable(&self, limits: Arc<PacketLimits>) -> Self::Modifiable {
        Self::Modifiable::from_snapshot(self, limits)
    }
}

/// Any interceptable packet, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Puback(PubackPacket),
    Pubrec(PubrecPacket),
    Pubrel(PubrelPacket),
    Pubcomp(PubcompPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(UnsubackPacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

macro_rules! interceptable {
    ($($variant:ident => $packet:ty, $modifiable:ty;)+) => {
        impl Packet {
            pub fn kind(&self) -> PacketKind {
                match self {
                    $(Self::$variant(_) => PacketKind::$variant,)+
                }
            }
        }

        $(
            impl Interceptable for $packet {
                type Modifiable = $modifiable;

                const KIND: PacketKind = PacketKind::$variant;

                fn into_packet(self) -> Packet {
                    Packet::$variant(self)
                }
            }

            impl From<$packet> for Packet {
                fn from(packet: $packet) -> Self {
                    Packet::$variant(packet)
                }
            }
        )+
    };
}

interceptable! {
    Connect => ConnectPacket, ModifiableConnectPacket;
    Connack => ConnackPacket, ModifiableConnackPacket;
    Publish => PublishPacket, ModifiablePublishPacket;
    Puback => PubackPacket, ModifiablePubackPacket;
    Pubrec => PubrecPacket, ModifiablePubrecPacket;
    Pubrel => PubrelPacket, ModifiablePubrelPacket;
    Pubcomp => PubcompPacket, ModifiablePubcompPacket;
    Subscribe => SubscribePacket, ModifiableSubscribePacket;
    Suback => SubackPacket, ModifiableSubackPacket;
    Unsubscribe => UnsubscribePacket, ModifiableUnsubscribePacket;
    Unsuback => UnsubackPacket, ModifiableUnsubackPacket;
    Disconnect => DisconnectPacket, ModifiableDisconnectPacket;
    Auth => AuthPacket, ModifiableAuthPacket;
}

/// Applies `value` to `slot` and reports whether anything changed.
pub(crate) fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
