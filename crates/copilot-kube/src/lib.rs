pub mod client;
pub mod error;
pub mod watch;

pub use client::{CompletionStore, CustomObjectsClient};
pub use error::{KubeError, Result};
pub use watch::{WatchEvent, WatchStream};
