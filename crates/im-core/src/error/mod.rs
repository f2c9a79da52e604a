//! Error types for the domain layer

mod gateway_error;

pub use gateway_error::{GatewayError, GatewayResult};
