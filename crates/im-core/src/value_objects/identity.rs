//! Client identity - names a session on the gateway
//!
//! Structure (serialized form, `_` separated):
//! - Part 0: Gateway ID (routing metadata, optional)
//! - Part 1: User ID (required; `tmp@` prefix marks a temporary identity)
//! - Part 2: Device ID (optional; lets one user hold several sessions)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix of the user part of a temporary (pre-authentication) identity
pub const TEMP_ID_PREFIX: &str = "tmp@";

/// Separator between the parts of a serialized identity
pub const ID_SEPARATOR: char = '_';

/// Client identity `(gateway, uid, device)`
///
/// Equality and hashing only consider `(uid, device)`: the gateway part says where
/// the session lives, not who it is. Values are never mutated in place; the
/// `with_*` methods return a new identity.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    gateway: String,
    uid: String,
    device: String,
}

impl Identity {
    /// Create an identity from all three parts
    pub fn new(gateway: impl Into<String>, uid: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            uid: uid.into(),
            device: device.into(),
        }
    }

    /// Create an identity from a user ID, with empty gateway and device
    pub fn from_uid(uid: impl Into<String>) -> Self {
        Self::new("", uid, "")
    }

    /// Generate a fresh temporary identity scoped to `gateway`
    #[must_use]
    pub fn generate_temp(gateway: impl Into<String>) -> Self {
        let uid = format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4().simple());
        Self::new(gateway, uid, "")
    }

    /// Parse the serialized form
    ///
    /// Never fails: missing parts come back empty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut parts = s.split(ID_SEPARATOR);
        let gateway = parts.next().unwrap_or_default();
        let uid = parts.next().unwrap_or_default();
        let device = parts.next().unwrap_or_default();
        Self::new(gateway, uid, device)
    }

    /// Gateway part
    #[inline]
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// User part
    #[inline]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Device part
    #[inline]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Check if this is a temporary identity
    #[inline]
    pub fn is_temp(&self) -> bool {
        self.uid.starts_with(TEMP_ID_PREFIX)
    }

    /// Check if the user part is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.uid.is_empty()
    }

    /// Return a copy bound to another gateway
    #[must_use]
    pub fn with_gateway(&self, gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            ..self.clone()
        }
    }

    /// Return a copy bound to another device
    #[must_use]
    pub fn with_device(&self, device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..self.clone()
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid && self.device == other.device
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
        self.device.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{ID_SEPARATOR}{}{ID_SEPARATOR}{}",
            self.gateway, self.uid, self.device
        )
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
