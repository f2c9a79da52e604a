//! Connection management
//!
//! One actor per client connection plus the transports it runs on.

mod config;
mod connection;
mod transport;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use transport::{
    FrameReader, FrameWriter, MemoryPeer, MemoryTransport, Transport, TransportError,
};
