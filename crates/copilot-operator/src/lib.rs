pub mod artifact;
pub mod config;
pub mod controller;
pub mod observability;
pub mod reconciler;
pub mod scheduler;

pub use controller::{Controller, ControllerError};
pub use reconciler::{ReconcileEngine, ReconcileError, ReconcileOutcome};
pub use scheduler::DebounceScheduler;
