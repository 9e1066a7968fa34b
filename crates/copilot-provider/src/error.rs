use thiserror::Error;

/// Errors from the completion provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body carries no usable choice. Defined
    /// explicitly as an error, not a silent no-op.
    #[error("Provider response contained no choices")]
    NoChoices,

    #[error("Invalid provider endpoint {url:?}: {message}")]
    InvalidEndpoint { url: String, message: String },
}

impl ProviderError {
    pub fn invalid_endpoint(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Convenience result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
