//! Shared data model and error types for the RAG core.
//!
//! Kept deliberately small: this crate is the one thing `rag`, `llm`, and `server`
//! all depend on, so it carries only the entities from the data model (§3) and the
//! error taxonomy (§7), not behavior.

mod error;
mod types;

pub use error::CoreError;
pub use types::*;

pub type Result<T> = std::result::Result<T, CoreError>;
