//! # im-core
//!
//! Domain layer containing client identities, the message envelope protocol,
//! authentication credentials, and the error taxonomy shared by the gateway crates.
//! This crate has zero dependencies on infrastructure (transport, runtime, crypto).

pub mod entities;
pub mod error;
pub mod protocol;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    ClientAuthCredentials, ClientInfo, ClientSecrets, ConnectionPolicy, EncryptedCredential,
    RiskControl,
};
pub use error::{GatewayError, GatewayResult};
pub use protocol::{Action, ClientFrame, Envelope, FrameError, HelloPayload, KickOutNotify, ServerHello};
pub use value_objects::{Identity, ID_SEPARATOR, TEMP_ID_PREFIX};
