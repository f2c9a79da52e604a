//! Envelope action tags
//!
//! The action is an open string tag. Tags the gateway itself understands get a
//! variant; anything else is carried through as [`Action::Other`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const INTERNAL_PREFIX: &str = "internal.";

/// Action of an [`Envelope`](super::Envelope)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Client greeting / server greeting (both directions)
    Hello,
    /// Keep-alive (both directions)
    Heartbeat,
    /// Client presents encrypted credentials
    Authenticate,
    /// Request succeeded
    NotifySuccess,
    /// Request failed
    NotifyError,
    /// Session was taken over by another connection
    NotifyKickOut,
    /// Message rejected by the delivery check
    NotifyForbidden,
    /// Nobody handles the requested action
    NotifyUnknownAction,
    /// A session came online (gateway-originated)
    InternalOnline,
    /// A session went offline (gateway-originated)
    InternalOffline,
    /// Direct chat message
    ChatMessage,
    /// Retransmitted direct chat message
    ChatMessageResend,
    /// Group chat message
    GroupMessage,
    /// Any other business action
    Other(String),
}

impl Action {
    /// Parse an action tag
    pub fn parse(s: &str) -> Self {
        match s {
            "hello" => Self::Hello,
            "heartbeat" => Self::Heartbeat,
            "authenticate" => Self::Authenticate,
            "notify.success" => Self::NotifySuccess,
            "notify.error" => Self::NotifyError,
            "notify.kickout" => Self::NotifyKickOut,
            "notify.forbidden" => Self::NotifyForbidden,
            "notify.unknown.action" => Self::NotifyUnknownAction,
            "internal.online" => Self::InternalOnline,
            "internal.offline" => Self::InternalOffline,
            "message.chat" => Self::ChatMessage,
            "message.chat.resend" => Self::ChatMessageResend,
            "message.group" => Self::GroupMessage,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hello => "hello",
            Self::Heartbeat => "heartbeat",
            Self::Authenticate => "authenticate",
            Self::NotifySuccess => "notify.success",
            Self::NotifyError => "notify.error",
            Self::NotifyKickOut => "notify.kickout",
            Self::NotifyForbidden => "notify.forbidden",
            Self::NotifyUnknownAction => "notify.unknown.action",
            Self::InternalOnline => "internal.online",
            Self::InternalOffline => "internal.offline",
            Self::ChatMessage => "message.chat",
            Self::ChatMessageResend => "message.chat.resend",
            Self::GroupMessage => "message.group",
            Self::Other(s) => s,
        }
    }

    /// Check if the action belongs to the gateway-internal namespace
    pub fn is_internal(&self) -> bool {
        self.as_str().starts_with(INTERNAL_PREFIX)
    }

    /// Check if sending this action requires a delivery ticket
    pub fn requires_ticket(&self) -> bool {
        matches!(
            self,
            Self::ChatMessage | Self::ChatMessageResend | Self::GroupMessage
        )
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
