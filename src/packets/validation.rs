//! Field validation shared by every modifiable packet.
//!
//! Limits come from the `[mqtt]` and `[restrictions]` config sections and are
//! handed to each modifiable packet behind an `Arc` when a stage starts.

use super::Qos;
use thiserror::Error;

/// Maximum length of an MQTT UTF-8 encoded string on the wire.
pub const UTF8_STRING_MAX_LENGTH: usize = 65_535;

/// Typed failure raised by a setter. The packet is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl PacketError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

pub type PacketResult<T> = Result<T, PacketError>;

/// Broker limits every extension-supplied value is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketLimits {
    pub max_utf8_string_length: usize,
    pub max_topic_length: usize,
    pub max_client_id_length: usize,
    pub validate_utf8: bool,
    pub maximum_qos: Qos,
    pub retained_messages_enabled: bool,
    pub max_message_expiry_interval: u64,
    pub max_session_expiry_interval: u64,
    pub max_keep_alive: u16,
    pub max_packet_size: u32,
}

impl Default for PacketLimits {
    fn default() -> Self {
        Self {
            max_utf8_string_length: UTF8_STRING_MAX_LENGTH,
            max_topic_length: UTF8_STRING_MAX_LENGTH,
            max_client_id_length: UTF8_STRING_MAX_LENGTH,
            validate_utf8: true,
            maximum_qos: Qos::ExactlyOnce,
            retained_messages_enabled: true,
            max_message_expiry_interval: u64::from(u32::MAX),
            max_session_expiry_interval: u64::from(u32::MAX),
            max_keep_alive: u16::MAX,
            max_packet_size: 268_435_460,
        }
    }
}

impl PacketLimits {
    /// Length and well-formedness check for any UTF-8 string field.
    pub fn check_string(&self, field: &str, value: &str) -> PacketResult<()> {
        let max = self.max_utf8_string_length.min(UTF8_STRING_MAX_LENGTH);
        if value.len() > max {
            return Err(PacketError::argument(format!(
                "{field} length must not exceed {max} bytes, but has {} bytes",
                value.len()
            )));
        }
        if !is_valid_utf8_string(value, self.validate_utf8) {
            return Err(PacketError::argument(format!(
                "{field} ({value:?}) is UTF-8 malformed"
            )));
        }
        Ok(())
    }

    pub fn check_optional_string(&self, field: &str, value: Option<&str>) -> PacketResult<()> {
        match value {
            Some(value) => self.check_string(field, value),
            None => Ok(()),
        }
    }

    pub fn check_user_property(&self, name: &str, value: &str) -> PacketResult<()> {
        self.check_string("user property name", name)?;
        self.check_string("user property value", value)
    }

    /// Topic name usable in a PUBLISH (no wildcards).
    pub fn check_topic(&self, topic: &str) -> PacketResult<()> {
        if topic.is_empty() {
            return Err(PacketError::argument("topic must not be empty"));
        }
        if topic.len() > self.max_topic_length {
            return Err(PacketError::argument(format!(
                "topic length must not exceed {} bytes, but has {} bytes",
                self.max_topic_length,
                topic.len()
            )));
        }
        if topic.contains(['+', '#']) {
            return Err(PacketError::argument(format!(
                "the topic ({topic}) is invalid for PUBLISH messages"
            )));
        }
        self.check_string("topic", topic)
    }

    /// Topic filter usable in a SUBSCRIBE or UNSUBSCRIBE.
    pub fn check_topic_filter(&self, filter: &str) -> PacketResult<()> {
        if filter.is_empty() {
            return Err(PacketError::argument("topic filter must not be empty"));
        }
        if filter.len() > self.max_topic_length {
            return Err(PacketError::argument(format!(
                "topic filter length must not exceed {} bytes, but has {} bytes",
                self.max_topic_length,
                filter.len()
            )));
        }
        if !is_valid_topic_filter(filter) {
            return Err(PacketError::argument(format!(
                "the topic filter ({filter}) is invalid"
            )));
        }
        self.check_string("topic filter", filter)
    }

    pub fn check_qos(&self, qos: Qos) -> PacketResult<()> {
        if qos.level() > self.maximum_qos.level() {
            return Err(PacketError::argument(format!(
                "QoS {} not allowed. Maximum = {}",
                qos.level(),
                self.maximum_qos.level()
            )));
        }
        Ok(())
    }

    pub fn check_message_expiry(&self, interval: u32) -> PacketResult<()> {
        if interval == 0 {
            return Err(PacketError::argument(
                "message expiry interval must be bigger than 0",
            ));
        }
        if u64::from(interval) > self.max_message_expiry_interval {
            return Err(PacketError::argument(format!(
                "message expiry interval {interval} not allowed. Maximum = {}",
                self.max_message_expiry_interval
            )));
        }
        Ok(())
    }

    pub fn check_session_expiry(&self, interval: u32) -> PacketResult<()> {
        if u64::from(interval) > self.max_session_expiry_interval {
            return Err(PacketError::argument(format!(
                "session expiry interval must not exceed the configured maximum of {}",
                self.max_session_expiry_interval
            )));
        }
        Ok(())
    }
}

/// MQTT forbids U+0000 outright; control and non-characters are only
/// rejected when strict validation is enabled.
pub fn is_valid_utf8_string(value: &str, validate_utf8: bool) -> bool {
    if value.contains('\u{0}') {
        return false;
    }
    !validate_utf8 || !value.chars().any(is_control_or_non_character)
}

fn is_control_or_non_character(c: char) -> bool {
    let cp = c as u32;
    matches!(cp, 0x0001..=0x001F | 0x007F..=0x009F | 0xFDD0..=0xFDEF) || (cp & 0xFFFE) == 0xFFFE
}

fn is_valid_topic_filter(filter: &str) -> bool {
    let effective = match filter.strip_prefix("$share/") {
        Some(rest) => match rest.split_once('/') {
            Some((group, inner)) if !group.is_empty() && !group.contains(['+', '#']) => inner,
            _ => return false,
        },
        None => filter,
    };
    if effective.is_empty() {
        return false;
    }
    let levels: Vec<&str> = effective.split('/').collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(idx, level)| {
        if level.contains('#') {
            *level == "#" && idx == last
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}
