//! Session registry and the external handler seam

mod handler;
mod session_registry;

pub use handler::{MessageHandler, NoopHandler, UnknownActionHandler};
pub use session_registry::{RegistryStats, SessionRegistry};
