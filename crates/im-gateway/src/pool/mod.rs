//! Outbound delivery workers

mod worker_pool;

pub use worker_pool::{PoolError, PoolStats, WorkerPool};
