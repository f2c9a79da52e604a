//! Domain entities - core gateway objects

mod client_info;
mod credentials;

pub use client_info::ClientInfo;
pub use credentials::{
    ClientAuthCredentials, ClientSecrets, ConnectionPolicy, EncryptedCredential, RiskControl,
};
