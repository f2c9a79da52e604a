//! Delivery tickets
//!
//! A ticket proves the business tier allowed `from` to message `to`:
//! `hex(SHA1(secret ∥ from ∥ hex(SHA1(secret ∥ to))))`.

use sha1::{Digest, Sha1};

/// Length of a hex-encoded ticket
pub const TICKET_LEN: usize = 40;

/// Ticket verification errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    #[error("ticket missing")]
    Missing,

    #[error("ticket malformed")]
    Malformed,

    #[error("ticket mismatch")]
    Mismatch,
}

/// Delivery ticket computation and verification
pub struct DeliveryTicket;

impl DeliveryTicket {
    /// Compute the ticket authorizing `from` to send to `to`
    pub fn compute(secret: &str, from: &str, to: &str) -> String {
        let inner = sha1_hex(&[secret, to]);
        sha1_hex(&[secret, from, &inner])
    }

    /// Verify a presented ticket (case-insensitive)
    pub fn verify(secret: &str, from: &str, to: &str, ticket: &str) -> Result<(), TicketError> {
        if ticket.is_empty() {
            return Err(TicketError::Missing);
        }
        if ticket.len() != TICKET_LEN || !ticket.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TicketError::Malformed);
        }
        if Self::compute(secret, from, to).eq_ignore_ascii_case(ticket) {
            Ok(())
        } else {
            Err(TicketError::Mismatch)
        }
    }
}

fn sha1_hex(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
