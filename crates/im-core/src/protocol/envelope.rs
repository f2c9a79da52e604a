//! Message envelope
//!
//! Every frame exchanged with a client is one JSON-encoded envelope. The gateway
//! only interprets the routing fields; `data` is opaque unless the action is
//! one the gateway handles itself.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{Action, KickOutNotify, ServerHello};
use crate::value_objects::Identity;

/// Routing envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version
    #[serde(default)]
    pub ver: i64,

    /// Request sequence, echoed by replies
    #[serde(default)]
    pub seq: i64,

    pub action: Action,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,

    /// Delivery ticket for ticket-gated actions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ticket: String,
}

impl Envelope {
    /// Create an envelope with no payload
    #[must_use]
    pub fn new(seq: i64, action: Action) -> Self {
        Self {
            ver: 0,
            seq,
            action,
            from: String::new(),
            to: String::new(),
            data: None,
            extra: HashMap::new(),
            ticket: String::new(),
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_data<T: Serialize>(mut self, data: T) -> Self {
        self.data = serde_json::to_value(data).ok().filter(|v| !v.is_null());
        self
    }

    /// Set the recipient
    #[must_use]
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Set the delivery ticket
    #[must_use]
    pub fn with_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = ticket.into();
        self
    }

    // === Gateway messages ===

    /// Server greeting sent to a freshly accepted connection
    #[must_use]
    pub fn hello(payload: &ServerHello) -> Self {
        Self::new(0, Action::Hello).with_data(payload)
    }

    /// Server heartbeat
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(0, Action::Heartbeat)
    }

    /// Success reply to request `seq`
    #[must_use]
    pub fn notify_success(seq: i64) -> Self {
        Self::new(seq, Action::NotifySuccess)
    }

    /// Error reply to request `seq`
    #[must_use]
    pub fn notify_error(seq: i64, message: impl Into<String>) -> Self {
        Self::new(seq, Action::NotifyError).with_data(message.into())
    }

    /// Delivery-check rejection of request `seq`
    #[must_use]
    pub fn notify_forbidden(seq: i64, reason: impl Into<String>) -> Self {
        Self::new(seq, Action::NotifyForbidden).with_data(reason.into())
    }

    /// Reply for an action nobody handles
    #[must_use]
    pub fn notify_unknown_action(seq: i64, action: &Action) -> Self {
        Self::new(seq, Action::NotifyUnknownAction).with_data(action.as_str())
    }

    /// Tell a connection it lost its session to another device
    #[must_use]
    pub fn kickout(notify: &KickOutNotify) -> Self {
        Self::new(0, Action::NotifyKickOut).with_data(notify)
    }

    /// Lifecycle event: `id` came online
    #[must_use]
    pub fn internal_online(id: &Identity) -> Self {
        Self::new(0, Action::InternalOnline).with_data(id)
    }

    /// Lifecycle event: `id` went offline
    #[must_use]
    pub fn internal_offline(id: &Identity) -> Self {
        Self::new(0, Action::InternalOffline).with_data(id)
    }

    // === Utilities ===

    /// Deserialize the payload (a missing payload decodes from `null`)
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(Value::Null))
    }

    /// Payload as a string, if it is one
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope(action={}, seq={}", self.action, self.seq)?;
        if !self.to.is_empty() {
            write!(f, ", to={}", self.to)?;
        }
        write!(f, ")")
    }
}
