//! # im-gateway
//!
//! Connection and session engine of the instant-messaging gateway: connection
//! actors, the session registry, credential authentication, and the WebSocket
//! front door.

pub mod connection;
pub mod handlers;
pub mod pool;
pub mod registry;
pub mod server;
pub mod timer;

pub use connection::{Connection, ConnectionConfig, ConnectionState, MemoryPeer, MemoryTransport, Transport};
pub use handlers::Authenticator;
pub use registry::{MessageHandler, SessionRegistry};
pub use server::{create_app, create_router, run, Gateway, GatewayState};
