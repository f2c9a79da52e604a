//! Gateway protocol definitions
//!
//! The routing envelope exchanged with clients, its action tags, typed client
//! frames, and the payloads the gateway itself produces or consumes.

mod action;
mod envelope;
mod frame;
mod payloads;

pub use action::Action;
pub use envelope::Envelope;
pub use frame::{ClientFrame, FrameError};
pub use payloads::{HelloPayload, KickOutNotify, ServerHello};
