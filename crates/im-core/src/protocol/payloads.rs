//! Payload definitions
//!
//! Payloads carried in the `data` field of gateway-level envelopes.

use serde::{Deserialize, Serialize};

/// Payload of a client `hello`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_type: String,
}

/// Payload of the server `hello`
///
/// Sent as the first frame of every connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_version: String,
    /// Temporary identity assigned to the connection
    #[serde(default)]
    pub temp_id: String,
    /// Heartbeat interval in milliseconds
    #[serde(default)]
    pub heartbeat_interval: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
}

impl ServerHello {
    /// Create a server hello
    #[must_use]
    pub fn new(
        server_version: impl Into<String>,
        temp_id: impl Into<String>,
        heartbeat_interval: u64,
    ) -> Self {
        Self {
            server_version: server_version.into(),
            temp_id: temp_id.into(),
            heartbeat_interval,
            protocols: Vec::new(),
        }
    }
}

/// Payload of `notify.kickout`
///
/// Names the device that took over the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickOutNotify {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
}
