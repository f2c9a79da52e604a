//! Authentication credentials - issued by the business tier, presented by clients

use serde::{Deserialize, Serialize};

use crate::value_objects::Identity;

/// Per-user secrets controlling what an authenticated client may do
///
/// The business tier keeps the secrets; clients never see them. To message a
/// peer, a client asks the business tier for a delivery ticket derived from
/// `message_deliver_secret` and attaches it to the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecrets {
    #[serde(default)]
    pub message_deliver_secret: String,
    #[serde(default)]
    pub online_state_secret: String,
}

/// Rate limits attached to a credential
///
/// Business tiers that emit untagged field names (`MaxMessagesPeerSecond`) are
/// accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskControl {
    #[serde(default, alias = "MaxMessagesPeerSecond")]
    pub max_messages_per_second: u32,
}

/// Connection policy requested by the business tier for this client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    #[serde(default, alias = "AllowMaxHeartbeatLost")]
    pub allow_max_heartbeat_lost: u32,
    /// Heartbeat interval in milliseconds
    #[serde(default, alias = "HeartbeatDuration")]
    pub heartbeat_duration: u64,
    #[serde(default, alias = "CloseImmediately")]
    pub close_immediately: bool,
}

/// Client authentication credentials
///
/// Generated by the business service, encrypted with the gateway's secret key,
/// and handed to the client, which presents the encrypted form in an
/// `authenticate` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAuthCredentials {
    /// Client type (robot, user, ...)
    #[serde(rename = "type", default)]
    pub client_type: i32,

    pub user_id: String,

    /// Unique per device for the same user
    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    pub device_name: String,

    #[serde(default)]
    pub secrets: Option<ClientSecrets>,

    #[serde(default)]
    pub risk_control: Option<RiskControl>,

    #[serde(default)]
    pub connection_config: Option<ConnectionPolicy>,

    /// Connection ID generated by the client
    #[serde(default)]
    pub connection_id: String,

    /// Creation time (unix milliseconds)
    pub timestamp: i64,
}

impl ClientAuthCredentials {
    /// Create credentials for a user/device pair
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            timestamp,
            ..Default::default()
        }
    }

    /// Attach secrets
    #[must_use]
    pub fn with_secrets(mut self, secrets: ClientSecrets) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Attach a device display name
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Durable identity these credentials authenticate, on `gateway`
    pub fn identity(&self, gateway: &str) -> Identity {
        Identity::new(gateway, self.user_id.as_str(), self.device_id.as_str())
    }

    /// Message delivery secret, if one was issued
    pub fn message_deliver_secret(&self) -> Option<&str> {
        self.secrets
            .as_ref()
            .map(|s| s.message_deliver_secret.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Age of the credentials relative to `now_ms`
    #[inline]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }
}

/// Encrypted credential as carried by an `authenticate` message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredential {
    #[serde(default)]
    pub version: i32,
    pub credential: String,
}
