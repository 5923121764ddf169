//! # Testbench Engine
//!
//! Client-side view-model of a workflow run and of the data-binding editor.
//!
//! ## Key Features
//!
//! - **Run control**: [`RunController`] starts an execution through the API,
//!   follows its live stream, and resolves the final verdict once the stream closes
//! - **Logs**: [`LogStore`] keeps the append-only run log; [`LogFilter`] projects
//!   it by level and step; [`format_message`] pretty-prints embedded JSON
//! - **Step status**: [`StepStatusTable`] tracks the latest state of every step
//! - **Bindings**: [`DataBindingModel`] edits source-to-target bindings, persisted
//!   through a [`BindingRepository`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use testbench_api::{PlatformClient, RunStreamClient};
//! use testbench_engine::RunController;
//! use testbench_util::PlatformConfig;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PlatformConfig::load()?;
//! let (mut controller, mut inbox) = RunController::new(
//!     Arc::new(PlatformClient::new(&config)?),
//!     Arc::new(RunStreamClient::from_config(&config)),
//! );
//! controller.start("wf-1", serde_json::Map::new())?;
//! while let Some(message) = inbox.recv().await {
//!     if let Some(outcome) = controller.apply(message) {
//!         println!("finished: {}", outcome.status);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod logs;
pub mod run;
pub mod session;
pub mod steps;

pub use bindings::{BindingError, BindingRepository, DataBindingModel, FileBindingRepository, InMemoryBindingRepository, Selection};
pub use logs::{LevelFilter, LogFilter, LogStore, StepFilter, StepOption, format_message};
pub use run::{CompletionCallback, ExecutionBackend, RunController, RunError, RunInbox, RunMessage, RunOutcome, StreamConnector};
pub use session::RunSession;
pub use steps::{StepCounts, StepState, StepStatusTable};
