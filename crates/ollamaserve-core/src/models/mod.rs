//! Data models for OllamaServe

mod ollama;
mod query;
mod stats;

pub use ollama::*;
pub use query::*;
pub use stats::*;
