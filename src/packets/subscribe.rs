use super::properties::{ModifiableUserProperties, UserProperties};
use super::reason::{ensure_same_class, SubackReasonCode};
use super::validation::{PacketError, PacketLimits, PacketResult};
use super::{replace_if_changed, ModifiablePacket, Qos};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainHandling {
    Send,
    SendIfNew,
    DoNotSend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_filter: String,
    pub qos: Qos,
    pub retain_handling: RetainHandling,
    pub retain_as_published: bool,
    pub no_local: bool,
}

impl Subscription {
    pub fn new(topic_filter: impl Into<String>, qos: Qos) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
            retain_handling: RetainHandling::Send,
            retain_as_published: false,
            no_local: false,
        }
    }
}

fn is_shared(filter: &str) -> bool {
    filter.starts_with("$share/")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
    pub subscription_identifier: Option<u32>,
    pub user_properties: UserProperties,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, subscriptions: Vec<Subscription>) -> Self {
        Self {
            packet_id,
            subscriptions,
            subscription_identifier: None,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableSubscription {
    subscription: Subscription,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableSubscription {
    pub fn topic_filter(&self) -> &str {
        &self.subscription.topic_filter
    }

    pub fn set_topic_filter(&mut self, filter: &str) -> PacketResult<()> {
        self.limits.check_topic_filter(filter)?;
        if self.subscription.no_local && is_shared(filter) {
            return Err(PacketError::argument(
                "no local is not allowed for shared subscriptions",
            ));
        }
        self.modified |= replace_if_changed(&mut self.subscription.topic_filter, filter.to_owned());
        Ok(())
    }

    pub fn qos(&self) -> Qos {
        self.subscription.qos
    }

    pub fn set_qos(&mut self, qos: Qos) -> PacketResult<()> {
        self.limits.check_qos(qos)?;
        self.modified |= replace_if_changed(&mut self.subscription.qos, qos);
        Ok(())
    }

    pub fn retain_handling(&self) -> RetainHandling {
        self.subscription.retain_handling
    }

    pub fn set_retain_handling(&mut self, retain_handling: RetainHandling) {
        self.modified |= replace_if_changed(&mut self.subscription.retain_handling, retain_handling);
    }

    pub fn retain_as_published(&self) -> bool {
        self.subscription.retain_as_published
    }

    pub fn set_retain_as_published(&mut self, retain_as_published: bool) {
        self.modified |=
            replace_if_changed(&mut self.subscription.retain_as_published, retain_as_published);
    }

    pub fn no_local(&self) -> bool {
        self.subscription.no_local
    }

    pub fn set_no_local(&mut self, no_local: bool) -> PacketResult<()> {
        if no_local && is_shared(&self.subscription.topic_filter) {
            return Err(PacketError::argument(
                "no local is not allowed for shared subscriptions",
            ));
        }
        self.modified |= replace_if_changed(&mut self.subscription.no_local, no_local);
        Ok(())
    }
}

/// SUBSCRIBE as seen by an interceptor. The number of subscriptions is
/// fixed; each one is modifiable in place.
#[derive(Debug)]
pub struct ModifiableSubscribePacket {
    packet_id: u16,
    subscription_identifier: Option<u32>,
    subscriptions: Vec<ModifiableSubscription>,
    user_properties: ModifiableUserProperties,
}

impl ModifiableSubscribePacket {
    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }

    pub fn subscription_identifier(&self) -> Option<u32> {
        self.subscription_identifier
    }

    pub fn subscriptions(&self) -> &[ModifiableSubscription] {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut [ModifiableSubscription] {
        &mut self.subscriptions
    }

    pub fn user_properties(&self) -> &ModifiableUserProperties {
        &self.user_properties
    }

    pub fn user_properties_mut(&mut self) -> &mut ModifiableUserProperties {
        &mut self.user_properties
    }
}

impl ModifiablePacket for ModifiableSubscribePacket {
    type Snapshot = SubscribePacket;

    fn from_snapshot(packet: &SubscribePacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            packet_id: packet.packet_id,
            subscription_identifier: packet.subscription_identifier,
            subscriptions: packet
                .subscriptions
                .iter()
                .map(|subscription| ModifiableSubscription {
                    subscription: subscription.clone(),
                    limits: limits.clone(),
                    modified: false,
                })
                .collect(),
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits),
        }
    }

    fn copy(&self) -> SubscribePacket {
        SubscribePacket {
            packet_id: self.packet_id,
            subscriptions: self
                .subscriptions
                .iter()
                .map(|s| s.subscription.clone())
                .collect(),
            subscription_identifier: self.subscription_identifier,
            user_properties: self.user_properties.copy(),
        }
    }

    fn is_modified(&self) -> bool {
        self.user_properties.is_modified() || self.subscriptions.iter().any(|s| s.modified)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubackPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<SubackReasonCode>,
    pub reason_string: Option<String>,
    pub user_properties: UserProperties,
}

impl SubackPacket {
    pub fn new(packet_id: u16, reason_codes: Vec<SubackReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            reason_string: None,
            user_properties: UserProperties::default(),
        }
    }
}

#[derive(Debug)]
pub struct ModifiableSubackPacket {
    packet: SubackPacket,
    user_properties: ModifiableUserProperties,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableSubackPacket {
    pub fn packet_id(&self) -> u16 {
        self.packet.packet_id
    }

    pub fn reason_codes(&self) -> &[SubackReasonCode] {
        &self.packet.reason_codes
    }

    /// Replaces the codes one per subscription. The count and each code's
    /// success class must match the current list.
    pub fn set_reason_codes(&mut self, reason_codes: Vec<SubackReasonCode>) -> PacketResult<()> {
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

/// Shared by SUBACK and UNSUBACK.
pub(crate) fn replace_reason_codes<R: super::ReasonCode>(
    current: &mut Vec<R>,
    next: Vec<R>,
) -> PacketResult<bool> {
    if next.len() != current.len() {
        return Err(PacketError::argument(format!(
            "the amount of reason codes must not be changed, expected {} but was {}",
            current.len(),
            next.len()
        )));
    }
    for (old, new) in current.iter().zip(&next) {
        ensure_same_class(*old, *new)?;
    }
    Ok(replace_if_changed(current, next))
}

impl ModifiablePacket for ModifiableSubackPacket {
    type Snapshot = SubackPacket;

    fn from_snapshot(packet: &SubackPacket, limits: Arc<PacketLimits>) -> Self {
        Self {
            user_properties: ModifiableUserProperties::new(&packet.user_properties, limits.clone()),
            packet: packet.clone(),
            limits,
            modified: false,
        }
    }

    fn copy(&self) -> SubackPacket {
        SubackPacket {
            user_properties: self.user_properties.copy(),
            ..self.packet.clone()
        }
    }

    fn is_modified(&self) -> bool {
        self.modified || self.user_properties.is_modified()
    }
}
