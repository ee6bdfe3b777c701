//! Error types

mod types;

pub use types::{ApiError, GENERIC_ERROR_MESSAGE};
