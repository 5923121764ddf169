//! Seams between the run controller and the platform services.
//!
//! The controller only talks to these traits so it can be driven by the real
//! API client in the binary and by in-process fakes in tests.

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use testbench_api::{ApiError, PlatformClient, RunStreamClient, RunSubscription, StreamError};
use testbench_types::WorkflowRunRecord;

/// Execution service: triggers runs and reports their final state.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Starts `workflow_id` with the given variables; the record carries the run id.
    async fn execute(&self, workflow_id: &str, variables: &JsonMap<String, Value>) -> Result<WorkflowRunRecord, ApiError>;

    /// Fetches the current record of a run.
    async fn get_run(&self, run_id: &str) -> Result<WorkflowRunRecord, ApiError>;
}

/// Opens live subscriptions keyed by run id.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, run_id: &str) -> Result<RunSubscription, StreamError>;
}

#[async_trait]
impl ExecutionBackend for PlatformClient {
    async fn execute(&self, workflow_id: &str, variables: &JsonMap<String, Value>) -> Result<WorkflowRunRecord, ApiError> {
        PlatformClient::execute(self, workflow_id, variables).await
    }

    async fn get_run(&self, run_id: &str) -> Result<WorkflowRunRecord, ApiError> {
        PlatformClient::get_run(self, run_id).await
    }
}

#[async_trait]
impl StreamConnector for RunStreamClient {
    async fn connect(&self, run_id: &str) -> Result<RunSubscription, StreamError> {
        RunStreamClient::connect(self, run_id).await
    }
}
