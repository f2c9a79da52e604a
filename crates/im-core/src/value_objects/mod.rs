//! Value objects - immutable domain primitives

mod identity;

pub use identity::{Identity, ID_SEPARATOR, TEMP_ID_PREFIX};
