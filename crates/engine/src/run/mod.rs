//! Run lifecycle: start, live stream, stop, and finalization.

pub mod backend;
pub mod controller;

pub use backend::{ExecutionBackend, StreamConnector};
pub use controller::{CompletionCallback, RunController, RunError, RunInbox, RunMessage, RunOutcome};
