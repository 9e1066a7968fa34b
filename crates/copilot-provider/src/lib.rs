pub mod client;
pub mod error;

pub use client::{
    CompletionBackend, CompletionClient, DEFAULT_COMPLETION_URL, DEFAULT_MAX_TOKENS,
};
pub use error::{ProviderError, Result};
