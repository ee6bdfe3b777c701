//! API schema definitions
//!
//! Request and response types for the OpenAI-compatible surface.

pub mod openai;

pub use openai::{ChatCompletionRequest, ErrorEnvelope};
