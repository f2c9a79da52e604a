//! Test fixtures and data generators
//!
//! Provides credentials and frames used across the gateway tests.

use chrono::Utc;
use im_common::{CredentialCodec, DeliveryTicket};
use im_core::{Action, ClientAuthCredentials, ClientSecrets, EncryptedCredential, Envelope};
use std::sync::atomic::{AtomicU64, Ordering};

/// Secret key the test gateway decrypts credentials with
pub const TEST_SECRET: &str = "integration-test-secret";

/// Delivery secret issued to every test user
pub const DELIVER_SECRET: &str = "deliver-secret";

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique user ID
pub fn unique_user() -> String {
    format!("user{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Fresh credentials for `user` on `device`
pub fn credentials(user: &str, device: &str, device_name: &str) -> ClientAuthCredentials {
    ClientAuthCredentials::new(user, device, Utc::now().timestamp_millis())
        .with_device_name(device_name)
        .with_secrets(ClientSecrets {
            message_deliver_secret: DELIVER_SECRET.to_string(),
            online_state_secret: String::new(),
        })
}

/// Encrypt credentials the way the business tier does
pub fn encrypt(credentials: &ClientAuthCredentials) -> EncryptedCredential {
    EncryptedCredential {
        version: 1,
        credential: CredentialCodec::new(TEST_SECRET)
            .encrypt(credentials)
            .unwrap_or_default(),
    }
}

/// `authenticate` frame carrying `credential`
pub fn authenticate(seq: i64, credential: &EncryptedCredential) -> Envelope {
    Envelope::new(seq, Action::Authenticate).with_data(credential)
}

/// Client `hello` frame
pub fn hello(seq: i64, version: &str) -> Envelope {
    Envelope::new(seq, Action::Hello).with_data(serde_json::json!({ "client_version": version }))
}

/// Chat message from `from` to `to` with a valid ticket
pub fn chat_message(seq: i64, from: &str, to: &str, text: &str) -> Envelope {
    Envelope::new(seq, Action::ChatMessage)
        .with_to(to)
        .with_ticket(DeliveryTicket::compute(DELIVER_SECRET, from, to))
        .with_data(text)
}
