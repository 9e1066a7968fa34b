pub mod backoff;
pub mod error;
pub mod resource;

pub use backoff::RetryPolicy;
pub use error::{CoreError, ErrorCategory, Result};
pub use resource::{
    Completion, CompletionSpec, CompletionStatus, ObjectMeta, COMPLETION_GROUP, COMPLETION_KIND,
    COMPLETION_PLURAL, COMPLETION_VERSION, DEFAULT_GENERATION,
};
