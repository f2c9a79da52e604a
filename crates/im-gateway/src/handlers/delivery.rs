//! Delivery check for business messages

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use im_common::{DeliveryTicket, TicketError};
use im_core::Envelope;

/// Stamps the sender and enforces delivery tickets
pub struct DeliveryCheck;

impl DeliveryCheck {
    /// Check `envelope` before it reaches the message handler
    ///
    /// `from` is always overwritten with the sender's uid. Ticket-gated actions
    /// also need an authenticated sender with a delivery secret and a ticket
    /// issued for this `from`/`to` pair.
    pub fn check(connection: &Connection, envelope: &mut Envelope) -> HandlerResult<()> {
        envelope.from = connection.id().uid().to_string();

        if !envelope.action.requires_ticket() {
            return Ok(());
        }

        let credentials = connection
            .credentials()
            .ok_or(HandlerError::Forbidden("no credentials"))?;
        let secret = credentials
            .message_deliver_secret()
            .ok_or(HandlerError::Forbidden("no message deliver secret"))?;

        DeliveryTicket::verify(secret, &envelope.from, &envelope.to, &envelope.ticket).map_err(
            |e| match e {
                TicketError::Missing | TicketError::Malformed => {
                    HandlerError::Forbidden("invalid ticket")
                }
                TicketError::Mismatch => HandlerError::Forbidden("ticket expired"),
            },
        )
    }
}
