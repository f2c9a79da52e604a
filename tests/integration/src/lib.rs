//! Integration test utilities for the IM gateway
//!
//! This crate provides helpers for running end-to-end tests against the
//! gateway, in-process and over WebSocket.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
