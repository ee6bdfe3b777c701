//! API endpoint handlers module
//!
//! Contains all HTTP endpoint handler implementations.

pub mod chat_completions;
pub mod health;
pub mod models;
