//! Reason codes per packet kind and the success/failure class rule.

use super::validation::{PacketError, PacketResult};
use std::fmt::Debug;

/// Reason code of one packet kind. Codes below `0x80` are the success
/// class, everything else is a failure.
pub trait ReasonCode: Copy + Debug + Eq + Send + Sync + 'static {
    /// Canonical success code of the kind.
    const SUCCESS: Self;

    fn code(self) -> u8;

    fn from_code(code: u8) -> Option<Self>;

    fn is_success(self) -> bool {
        self.code() < 0x80
    }
}

/// Rejects a transition that flips the outcome class of an acknowledgement.
pub(crate) fn ensure_same_class<R: ReasonCode>(current: R, next: R) -> PacketResult<()> {
    if current.is_success() != next.is_success() {
        let (from, to) = if current.is_success() {
            ("successful", "unsuccessful")
        } else {
            ("unsuccessful", "successful")
        };
        return Err(PacketError::state(format!(
            "reason code must not switch from {from} ({current:?}) to {to} ({next:?})"
        )));
    }
    Ok(())
}

/// A reason string is only meaningful next to a non-canonical code.
pub(crate) fn ensure_reason_string_allowed<R: ReasonCode>(
    code: R,
    reason_string: Option<&str>,
) -> PacketResult<()> {
    if reason_string.is_some() && code == R::SUCCESS {
        return Err(PacketError::state(format!(
            "reason string must not be set when reason code is {code:?}"
        )));
    }
    Ok(())
}

macro_rules! reason_codes {
    (
        $(#[$meta:meta])*
        $name:ident, success = $success:ident {
            $($variant:ident = $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl ReasonCode for $name {
            const SUCCESS: Self = Self::$success;

            fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

reason_codes! {
    /// PUBACK and PUBREC.
    AckReasonCode, success = Success {
        Success = 0x00,
        NoMatchingSubscribers = 0x10,
        UnspecifiedError = 0x80,
        ImplementationSpecificError = 0x83,
        NotAuthorized = 0x87,
        TopicNameInvalid = 0x90,
        PacketIdentifierInUse = 0x91,
        QuotaExceeded = 0x97,
        PayloadFormatInvalid = 0x99,
    }
}

reason_codes! {
    /// PUBREL and PUBCOMP.
    PubrelReasonCode, success = Success {
        Success = 0x00,
        PacketIdentifierNotFound = 0x92,
    }
}

reason_codes! {
    ConnackReasonCode, success = Success {
        Success = 0x00,
        UnspecifiedError = 0x80,
        MalformedPacket = 0x81,
        ProtocolError = 0x82,
        ImplementationSpecificError = 0x83,
        UnsupportedProtocolVersion = 0x84,
        ClientIdentifierNotValid = 0x85,
        BadUserNameOrPassword = 0x86,
        NotAuthorized = 0x87,
        ServerUnavailable = 0x88,
        ServerBusy = 0x89,
        Banned = 0x8A,
        BadAuthenticationMethod = 0x8C,
        TopicNameInvalid = 0x90,
        PacketTooLarge = 0x95,
        QuotaExceeded = 0x97,
        PayloadFormatInvalid = 0x99,
        RetainNotSupported = 0x9A,
        QosNotSupported = 0x9B,
        UseAnotherServer = 0x9C,
        ServerMoved = 0x9D,
        ConnectionRateExceeded = 0x9F,
    }
}

reason_codes! {
    /// Per-subscription result. The three granted codes form the success class.
    SubackReasonCode, success = GrantedQos0 {
        GrantedQos0 = 0x00,
        GrantedQos1 = 0x01,
        GrantedQos2 = 0x02,
        UnspecifiedError = 0x80,
        ImplementationSpecificError = 0x83,
        NotAuthorized = 0x87,
        TopicFilterInvalid = 0x8F,
        PacketIdentifierInUse = 0x91,
        QuotaExceeded = 0x97,
        SharedSubscriptionsNotSupported = 0x9E,
        SubscriptionIdentifiersNotSupported = 0xA1,
        WildcardSubscriptionsNotSupported = 0xA2,
    }
}

reason_codes! {
    UnsubackReasonCode, success = Success {
        Success = 0x00,
        NoSubscriptionExisted = 0x11,
        UnspecifiedError = 0x80,
        ImplementationSpecificError = 0x83,
        NotAuthorized = 0x87,
        TopicFilterInvalid = 0x8F,
        PacketIdentifierInUse = 0x91,
    }
}

reason_codes! {
    DisconnectReasonCode, success = NormalDisconnection {
        NormalDisconnection = 0x00,
        DisconnectWithWillMessage = 0x04,
        UnspecifiedError = 0x80,
        MalformedPacket = 0x81,
        ProtocolError = 0x82,
        ImplementationSpecificError = 0x83,
        NotAuthorized = 0x87,
        ServerBusy = 0x89,
        ServerShuttingDown = 0x8B,
        BadAuthenticationMethod = 0x8C,
        KeepAliveTimeout = 0x8D,
        SessionTakenOver = 0x8E,
        TopicFilterInvalid = 0x8F,
        TopicNameInvalid = 0x90,
        ReceiveMaximumExceeded = 0x93,
        TopicAliasInvalid = 0x94,
        PacketTooLarge = 0x95,
        MessageRateTooHigh = 0x96,
        QuotaExceeded = 0x97,
        AdministrativeAction = 0x98,
        PayloadFormatInvalid = 0x99,
        RetainNotSupported = 0x9A,
        QosNotSupported = 0x9B,
        UseAnotherServer = 0x9C,
        ServerMoved = 0x9D,
        SharedSubscriptionsNotSupported = 0x9E,
        ConnectionRateExceeded = 0x9F,
        MaximumConnectTime = 0xA0,
        SubscriptionIdentifiersNotSupported = 0xA1,
        WildcardSubscriptionsNotSupported = 0xA2,
    }
}

impl DisconnectReasonCode {
    pub fn can_be_sent_by_client(self) -> bool {
        matches!(
            self,
            Self::NormalDisconnection
                | Self::DisconnectWithWillMessage
                | Self::UnspecifiedError
                | Self::MalformedPacket
                | Self::ProtocolError
                | Self::ImplementationSpecificError
                | Self::TopicNameInvalid
                | Self::ReceiveMaximumExceeded
                | Self::TopicAliasInvalid
                | Self::PacketTooLarge
                | Self::MessageRateTooHigh
                | Self::QuotaExceeded
                | Self::AdministrativeAction
                | Self::PayloadFormatInvalid
        )
    }

    pub fn can_be_sent_by_server(self) -> bool {
        self != Self::DisconnectWithWillMessage
    }
}

reason_codes! {
    /// Every AUTH code is in the success class.
    AuthReasonCode, success = Success {
        Success = 0x00,
        ContinueAuthentication = 0x18,
        ReAuthenticate = 0x19,
    }
}
