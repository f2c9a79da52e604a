//! Credential encryption and delivery tickets

mod credential_codec;
mod ticket;

pub use credential_codec::{normalize_key, CredentialCodec, CredentialError, BLOCK_SIZE};
pub use ticket::{DeliveryTicket, TicketError, TICKET_LEN};
