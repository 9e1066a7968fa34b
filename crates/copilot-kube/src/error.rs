use thiserror::Error;

/// Errors from the custom-objects API client.
#[derive(Debug, Error)]
pub enum KubeError {
    /// The watch subscription could not be established at all. Distinct from
    /// a stream that ends after it was opened; the caller treats repeated
    /// establishment failures as fatal.
    #[error("Failed to connect to API server: {0}")]
    Connect(#[source] reqwest::Error),

    /// The established stream broke mid-flight.
    #[error("Watch stream error: {0}")]
    Stream(#[source] reqwest::Error),

    /// A single watch line could not be decoded. The stream itself is fine.
    #[error("Failed to decode watch event: {0}")]
    Decode(#[from] serde_json::Error),

    /// The replace was rejected because the object changed underneath us.
    #[error("Conflict replacing {name}: resource version is stale")]
    Conflict { name: String },

    #[error("API server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Object has no name, cannot build its URL")]
    UnnamedObject,
}

impl KubeError {
    /// Decode failures affect one event only; everything else tears down or
    /// fails the current call.
    pub fn is_event_local(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Convenience result type for API-server operations
pub type Result<T> = std::result::Result<T, KubeError>;
