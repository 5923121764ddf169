//! Run controller: drives one workflow execution attempt end to end.
//!
//! The controller is a single-owner state machine. Network work (the start
//! request, the live stream, the finalization fetch) runs on spawned tasks
//! that report back through a [`RunInbox`]; the owner feeds each
//! [`RunMessage`] to [`RunController::apply`], so every mutation of the log,
//! step table, and session happens on the owner's task in arrival order.
//!
//! Messages carry the attempt they belong to, and stream notices also carry
//! the stream they came from. Anything addressed to an older attempt, a
//! replaced stream, or a controller that has been shut down is discarded.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value};
use testbench_api::ApiError;
use testbench_types::{LogLevel, RunStatus, StepOutcome, StreamEvent, StreamNotice, WorkflowRunRecord};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{ExecutionBackend, StreamConnector};
use crate::{logs::LogStore, session::RunSession, steps::StepStatusTable};

/// Reasons a start request is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("a start request is already pending")]
    StartPending,
}

/// Final verdict of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Missing when the start request itself failed.
    pub run_id: Option<String>,
    /// `Success` or `Failed`.
    pub status: RunStatus,
}

/// Invoked once per attempt when it reaches a terminal status.
pub type CompletionCallback = Box<dyn FnMut(&RunOutcome) + Send>;

/// Completion of asynchronous work started by the controller.
#[derive(Debug)]
pub enum RunMessage {
    Started {
        attempt: u64,
        result: Result<WorkflowRunRecord, ApiError>,
    },
    Stream {
        attempt: u64,
        stream_id: u64,
        notice: StreamNotice,
    },
    Finalized {
        attempt: u64,
        result: Result<WorkflowRunRecord, ApiError>,
    },
}

/// Receiving side of the controller's message channel.
#[derive(Debug)]
pub struct RunInbox {
    receiver: mpsc::UnboundedReceiver<RunMessage>,
}

impl RunInbox {
    /// Waits for the next message.
    pub async fn recv(&mut self) -> Option<RunMessage> {
        self.receiver.recv().await
    }

    /// Returns a message if one is ready.
    pub fn try_recv(&mut self) -> Option<RunMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Open stream owned by the controller. Dropping it closes the stream.
struct StreamHandle {
    id: u64,
    _close_tx: oneshot::Sender<()>,
}

pub struct RunController {
    backend: Arc<dyn ExecutionBackend>,
    connector: Arc<dyn StreamConnector>,
    sender: mpsc::UnboundedSender<RunMessage>,
    session: RunSession,
    logs: LogStore,
    steps: StepStatusTable,
    attempt: u64,
    start_pending: bool,
    stream: Option<StreamHandle>,
    next_stream_id: u64,
    live: bool,
    alive: bool,
    on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("session", &self.session)
            .field("attempt", &self.attempt)
            .field("start_pending", &self.start_pending)
            .field("stream", &self.stream.as_ref().map(|stream| stream.id))
            .field("live", &self.live)
            .field("alive", &self.alive)
            .field("logs", &self.logs.len())
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl RunController {
    /// Creates an idle controller and the inbox its background work reports to.
    pub fn new(backend: Arc<dyn ExecutionBackend>, connector: Arc<dyn StreamConnector>) -> (Self, RunInbox) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            connector,
            sender,
            session: RunSession::default(),
            logs: LogStore::new(),
            steps: StepStatusTable::new(),
            attempt: 0,
            start_pending: false,
            stream: None,
            next_stream_id: 0,
            live: false,
            alive: true,
            on_complete: None,
        };
        (controller, RunInbox { receiver })
    }

    /// Registers a callback fired when an attempt reaches a terminal status.
    pub fn set_on_complete(&mut self, callback: CompletionCallback) {
        self.on_complete = Some(callback);
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn steps(&self) -> &StepStatusTable {
        &self.steps
    }

    /// True while a stream is open and has reported `Opened`.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_start_pending(&self) -> bool {
        self.start_pending
    }

    /// Whether `start` would currently be accepted.
    pub fn can_start(&self) -> bool {
        self.alive && !self.start_pending && !self.session.is_running()
    }

    /// Clears the visible log. Returns `false` when there was nothing to clear.
    pub fn clear_logs(&mut self) -> bool {
        self.logs.clear()
    }

    /// Begins a new attempt: resets logs and steps and calls the execution API.
    ///
    /// The API result arrives later as [`RunMessage::Started`].
    pub fn start(&mut self, workflow_id: &str, variables: JsonMap<String, Value>) -> Result<(), RunError> {
        if self.start_pending {
            return Err(RunError::StartPending);
        }
        if self.session.is_running() {
            return Err(RunError::AlreadyRunning);
        }

        self.disconnect_stream();
        self.logs.clear();
        self.steps.clear();
        self.attempt += 1;
        self.session = RunSession::begin(workflow_id);
        self.start_pending = true;

        let attempt = self.attempt;
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let workflow_id = workflow_id.to_string();
        info!(%workflow_id, attempt, variables = variables.len(), "starting workflow");
        tokio::spawn(async move {
            let result = backend.execute(&workflow_id, &variables).await;
            let _ = sender.send(RunMessage::Started { attempt, result });
        });
        Ok(())
    }

    /// Stops a running attempt: closes the stream and freezes the session.
    ///
    /// Returns `false` when nothing is running.
    pub fn stop(&mut self) -> bool {
        if !self.alive || !self.session.is_running() {
            return false;
        }
        self.disconnect_stream();
        self.logs.system(LogLevel::Warn, "Execution stopped by user");
        self.session.mark_stopped();
        info!(run_id = ?self.session.run_id(), "run stopped by user");
        true
    }

    /// Tears the controller down. Later messages are ignored.
    pub fn shutdown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.disconnect_stream();
        debug!(attempt = self.attempt, "run controller shut down");
    }

    /// Applies one message from the inbox.
    ///
    /// Returns the verdict when the message brought the attempt to a terminal status.
    pub fn apply(&mut self, message: RunMessage) -> Option<RunOutcome> {
        if !self.alive {
            return None;
        }
        match message {
            RunMessage::Started { attempt, result } => {
                if attempt != self.attempt {
                    debug!(attempt, current = self.attempt, "ignoring start result of a previous attempt");
                    return None;
                }
                self.on_started(result)
            }
            RunMessage::Stream {
                attempt,
                stream_id,
                notice,
            } => {
                if attempt != self.attempt || self.stream.as_ref().map(|stream| stream.id) != Some(stream_id) {
                    debug!(attempt, stream_id, "ignoring notice from an inactive stream");
                    return None;
                }
                self.on_notice(notice);
                None
            }
            RunMessage::Finalized { attempt, result } => {
                if attempt != self.attempt || self.session.is_stopped() {
                    debug!(attempt, "ignoring finalization of an inactive attempt");
                    return None;
                }
                self.on_finalized(result)
            }
        }
    }

    fn on_started(&mut self, result: Result<WorkflowRunRecord, ApiError>) -> Option<RunOutcome> {
        self.start_pending = false;
        match result {
            Ok(record) => {
                info!(run_id = %record.run_id, "workflow execution started");
                self.session.assign_run_id(record.run_id.clone());
                self.session.advance(RunStatus::Running);
                self.open_stream(record.run_id);
                None
            }
            Err(error) => {
                warn!(%error, "failed to start workflow");
                self.logs.system(LogLevel::Error, format!("Failed to start workflow: {error}"));
                self.session.advance(RunStatus::Failed);
                Some(self.complete(RunStatus::Failed))
            }
        }
    }

    /// Opens the live stream for `run_id`, replacing any previous one.
    fn open_stream(&mut self, run_id: String) {
        self.disconnect_stream();
        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let attempt = self.attempt;
        let (close_tx, close_rx) = oneshot::channel();
        self.stream = Some(StreamHandle {
            id: stream_id,
            _close_tx: close_tx,
        });

        let connector = Arc::clone(&self.connector);
        let sender = self.sender.clone();
        tokio::spawn(forward_stream(connector, run_id, attempt, stream_id, sender, close_rx));
    }

    fn disconnect_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(stream_id = stream.id, "disconnecting run stream");
        }
        self.live = false;
    }

    fn on_notice(&mut self, notice: StreamNotice) {
        match notice {
            StreamNotice::Opened => {
                self.live = true;
                info!(run_id = ?self.session.run_id(), "run stream connected");
            }
            StreamNotice::Event(event) => self.on_event(event),
            StreamNotice::Unrecognized(reason) => {
                warn!(run_id = ?self.session.run_id(), %reason, "ignoring unrecognised stream message");
            }
            StreamNotice::Error(message) => {
                self.live = false;
                self.logs.system(LogLevel::Error, format!("Stream error: {message}"));
            }
            StreamNotice::Closed => {
                info!(run_id = ?self.session.run_id(), "run stream closed");
                self.disconnect_stream();
                self.finalize();
            }
        }
    }

    fn on_event(&mut self, event: StreamEvent) {
        debug!(kind = event.kind(), step_id = event.step_id(), "stream event");
        match event {
            StreamEvent::StepStart(payload) => {
                self.steps.on_step_start(&payload.step_id, &payload.step_name);
            }
            StreamEvent::StepComplete(payload) => {
                self.steps.on_step_complete(&payload.step_id, &payload.step_name, payload.status, payload.duration);
                let (level, verb) = match payload.status {
                    StepOutcome::Success => (LogLevel::Info, "completed"),
                    StepOutcome::Failed => (LogLevel::Error, "failed"),
                };
                let message = format!("Step {verb}: {} ({}ms)", payload.step_name, payload.duration);
                self.logs.append(payload.step_id, Some(payload.step_name), level, message);
            }
            StreamEvent::StepLog(payload) => {
                let step_name = self.steps.step_name(&payload.step_id).map(str::to_string);
                self.logs.append(payload.step_id, step_name, payload.level, payload.message);
            }
            StreamEvent::VariableChange(payload) => {
                let step_name = self.steps.step_name(&payload.step_id).map(str::to_string);
                let value = serde_json::to_string(&payload.new_value).unwrap_or_else(|_| "null".to_string());
                let message = format!("Variable {}: {} = {}", payload.change_type.as_str(), payload.var_name, value);
                self.logs.append(payload.step_id, step_name, LogLevel::Debug, message);
            }
        }
    }

    /// Fetches the run's final record after the stream closed.
    fn finalize(&mut self) {
        let Some(run_id) = self.session.run_id().map(str::to_string) else {
            return;
        };
        let attempt = self.attempt;
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = backend.get_run(&run_id).await;
            let _ = sender.send(RunMessage::Finalized { attempt, result });
        });
    }

    fn on_finalized(&mut self, result: Result<WorkflowRunRecord, ApiError>) -> Option<RunOutcome> {
        let status = match result {
            Ok(record) if record.is_completed() => {
                self.logs.system(LogLevel::Info, "Workflow completed.");
                RunStatus::Success
            }
            Ok(record) => {
                self.logs.system(LogLevel::Error, format!("Workflow failed. Status: {}", record.status));
                RunStatus::Failed
            }
            Err(error) => {
                warn!(%error, "failed to fetch run result");
                self.logs.system(LogLevel::Error, format!("Failed to fetch run result: {error}"));
                RunStatus::Failed
            }
        };
        if !self.session.advance(status) {
            return None;
        }
        info!(run_id = ?self.session.run_id(), %status, "run finished");
        Some(self.complete(status))
    }

    fn complete(&mut self, status: RunStatus) -> RunOutcome {
        let outcome = RunOutcome {
            run_id: self.session.run_id().map(str::to_string),
            status,
        };
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&outcome);
        }
        outcome
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connects the stream and forwards its notices until it ends or is closed.
///
/// A failed connection is reported as `Error` followed by `Closed`, so the
/// controller still finalizes the run.
async fn forward_stream(
    connector: Arc<dyn StreamConnector>,
    run_id: String,
    attempt: u64,
    stream_id: u64,
    sender: mpsc::UnboundedSender<RunMessage>,
    close_rx: oneshot::Receiver<()>,
) {
    tokio::pin!(close_rx);
    let send = |notice: StreamNotice| {
        sender
            .send(RunMessage::Stream {
                attempt,
                stream_id,
                notice,
            })
            .is_ok()
    };

    let mut subscription = tokio::select! {
        biased;

        _ = &mut close_rx => return,
        result = connector.connect(&run_id) => match result {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(%run_id, %error, "failed to open run stream");
                if send(StreamNotice::Error(error.to_string())) {
                    send(StreamNotice::Closed);
                }
                return;
            }
        },
    };

    loop {
        tokio::select! {
            biased;

            _ = &mut close_rx => {
                subscription.disconnect();
                return;
            }
            notice = subscription.next() => {
                let notice = notice.unwrap_or(StreamNotice::Closed);
                let closed = notice == StreamNotice::Closed;
                if !send(notice) || closed {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use testbench_api::{RunSubscription, StreamError};
    use testbench_types::{
        StepCompletePayload, StepLogPayload, StepStartPayload, StepStatus, VariableChangePayload, VariableChangeType,
    };
    use tokio::time::timeout;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        executions: Mutex<VecDeque<Result<WorkflowRunRecord, ApiError>>>,
        runs: Mutex<VecDeque<Result<WorkflowRunRecord, ApiError>>>,
        execute_calls: AtomicUsize,
        get_run_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn with(executions: Vec<Result<WorkflowRunRecord, ApiError>>, runs: Vec<Result<WorkflowRunRecord, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                executions: Mutex::new(executions.into()),
                runs: Mutex::new(runs.into()),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl ExecutionBackend for FakeBackend {
        async fn execute(&self, _workflow_id: &str, _variables: &JsonMap<String, Value>) -> Result<WorkflowRunRecord, ApiError> {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.executions.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(ApiError::Server("no scripted execution".into())))
        }

        async fn get_run(&self, _run_id: &str) -> Result<WorkflowRunRecord, ApiError> {
            self.get_run_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.runs.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(ApiError::NotFound("no scripted run".into())))
        }
    }

    /// Replays scripted notices. Scripts without `Closed` stay open until disconnected.
    #[derive(Default)]
    struct FakeConnector {
        scripts: Mutex<VecDeque<Result<Vec<StreamNotice>, String>>>,
        open_senders: Mutex<Vec<mpsc::Sender<StreamNotice>>>,
        connects: AtomicUsize,
    }

    impl FakeConnector {
        fn with(scripts: Vec<Result<Vec<StreamNotice>, String>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                ..Self::default()
            })
        }

        fn last_sender(&self) -> Option<mpsc::Sender<StreamNotice>> {
            self.open_senders.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl StreamConnector for FakeConnector {
        async fn connect(&self, run_id: &str) -> Result<RunSubscription, StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()));
            let notices = script.map_err(|reason| StreamError::Request {
                url: format!("ws://fake/{run_id}"),
                reason,
            })?;
            let (sender, subscription) = RunSubscription::channel(64);
            let keep_open = !notices.contains(&StreamNotice::Closed);
            for notice in notices {
                sender.try_send(notice).unwrap();
            }
            if keep_open {
                self.open_senders.lock().unwrap().push(sender);
            }
            Ok(subscription)
        }
    }

    fn started(run_id: &str) -> Result<WorkflowRunRecord, ApiError> {
        Ok(WorkflowRunRecord {
            run_id: run_id.into(),
            status: "running".into(),
            ..WorkflowRunRecord::default()
        })
    }

    fn finished(status: &str) -> Result<WorkflowRunRecord, ApiError> {
        Ok(WorkflowRunRecord {
            run_id: "run-1".into(),
            status: status.into(),
            ..WorkflowRunRecord::default()
        })
    }

    fn step_start(step_id: &str, step_name: &str) -> StreamNotice {
        StreamNotice::Event(StreamEvent::StepStart(StepStartPayload {
            step_id: step_id.into(),
            step_name: step_name.into(),
        }))
    }

    fn step_log(step_id: &str, level: LogLevel, message: &str) -> StreamNotice {
        StreamNotice::Event(StreamEvent::StepLog(StepLogPayload {
            step_id: step_id.into(),
            level,
            message: message.into(),
            timestamp: None,
        }))
    }

    fn step_complete(step_id: &str, step_name: &str, status: StepOutcome, duration: u64) -> StreamNotice {
        StreamNotice::Event(StreamEvent::StepComplete(StepCompletePayload {
            step_id: step_id.into(),
            step_name: step_name.into(),
            status,
            duration,
        }))
    }

    async fn pump_until(controller: &mut RunController, inbox: &mut RunInbox, done: impl Fn(&RunController) -> bool) {
        timeout(Duration::from_secs(5), async {
            while !done(&*controller) {
                let message = inbox.recv().await.expect("controller keeps the channel open");
                controller.apply(message);
            }
        })
        .await
        .expect("condition reached before timeout");
    }

    fn terminal(controller: &RunController) -> bool {
        controller.session().status().is_terminal()
    }

    fn messages(controller: &RunController) -> Vec<String> {
        controller.logs().entries().iter().map(|entry| entry.message.clone()).collect()
    }

    #[tokio::test]
    async fn successful_run_is_finalized_as_success() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("completed")]);
        let connector = FakeConnector::with(vec![Ok(vec![
            StreamNotice::Opened,
            step_start("s1", "Login"),
            step_log("s1", LogLevel::Info, "hit endpoint"),
            step_complete("s1", "Login", StepOutcome::Success, 120),
            StreamNotice::Closed,
        ])]);
        let (mut controller, mut inbox) = RunController::new(backend.clone(), connector.clone());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&outcomes);
        controller.set_on_complete(Box::new(move |outcome: &RunOutcome| recorded.lock().unwrap().push(outcome.clone())));

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        assert_eq!(controller.session().status(), RunStatus::Success);
        assert_eq!(controller.session().run_id(), Some("run-1"));
        assert_eq!(controller.steps().len(), 1);
        let step = controller.steps().get("s1").unwrap();
        assert_eq!((step.status, step.duration_ms), (StepStatus::Success, Some(120)));

        assert_eq!(messages(&controller), vec!["hit endpoint", "Step completed: Login (120ms)", "Workflow completed."]);
        let entries = controller.logs().entries();
        assert_eq!(entries[0].step_name.as_deref(), Some("Login"));
        assert!(entries[2].is_system());
        assert!(!controller.is_live());

        assert_eq!(
            outcomes.lock().unwrap().as_slice(),
            &[RunOutcome {
                run_id: Some("run-1".into()),
                status: RunStatus::Success,
            }]
        );
        assert_eq!(backend.get_run_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_failure_fails_without_stream() {
        let backend = FakeBackend::with(vec![Err(ApiError::Server("database unavailable".into()))], vec![]);
        let connector = FakeConnector::with(vec![]);
        let (mut controller, mut inbox) = RunController::new(backend, connector.clone());

        controller.start("wf-1", JsonMap::new()).unwrap();
        assert!(controller.is_start_pending());
        let message = timeout(Duration::from_secs(5), inbox.recv()).await.unwrap().unwrap();
        let outcome = controller.apply(message);

        assert_eq!(
            outcome,
            Some(RunOutcome {
                run_id: None,
                status: RunStatus::Failed,
            })
        );
        assert_eq!(controller.session().status(), RunStatus::Failed);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        let entries = controller.logs().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[0].message, "Failed to start workflow: server error: database unavailable");
    }

    #[tokio::test]
    async fn stop_disconnects_and_keeps_status() {
        let backend = FakeBackend::with(vec![started("run-1"), started("run-2")], vec![]);
        let connector = FakeConnector::with(vec![Ok(vec![StreamNotice::Opened, step_start("s1", "Login")])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector.clone());

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, |controller| !controller.steps().is_empty()).await;
        assert!(controller.is_live());
        let stream_sender = connector.last_sender().unwrap();
        let log_count = controller.logs().len();

        assert!(controller.stop());
        assert_eq!(controller.session().status(), RunStatus::Running);
        assert!(controller.session().is_stopped());
        assert!(!controller.is_live());
        assert_eq!(controller.logs().len(), log_count + 1);
        let last = controller.logs().entries().last().unwrap();
        assert_eq!((last.level, last.message.as_str()), (LogLevel::Warn, "Execution stopped by user"));

        timeout(Duration::from_secs(5), stream_sender.closed()).await.expect("stream disconnected");
        let _ = stream_sender.send(StreamNotice::Closed).await;

        assert!(!controller.stop());
        assert_eq!(controller.logs().len(), log_count + 1);

        assert_eq!(controller.start("wf-1", JsonMap::new()), Ok(()));
        assert!(controller.logs().is_empty());
        assert_eq!(controller.session().status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn stop_is_a_no_op_when_idle_or_pending() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![]);
        let (mut controller, _inbox) = RunController::new(backend, FakeConnector::with(vec![]));
        assert!(!controller.stop());

        controller.start("wf-1", JsonMap::new()).unwrap();
        assert!(!controller.stop());
        assert!(controller.logs().is_empty());
    }

    #[tokio::test]
    async fn non_completed_status_is_a_failure() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("failed")]);
        let connector = FakeConnector::with(vec![Ok(vec![
            StreamNotice::Opened,
            step_complete("s1", "Login", StepOutcome::Failed, 40),
            StreamNotice::Closed,
        ])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        assert_eq!(controller.session().status(), RunStatus::Failed);
        assert_eq!(messages(&controller), vec!["Step failed: Login (40ms)", "Workflow failed. Status: failed"]);
        assert_eq!(controller.logs().entries()[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn finalization_fetch_failure_marks_failed() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![Err(ApiError::NotFound("run not found".into()))]);
        let connector = FakeConnector::with(vec![Ok(vec![StreamNotice::Opened, StreamNotice::Closed])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        assert_eq!(controller.session().status(), RunStatus::Failed);
        assert_eq!(messages(&controller), vec!["Failed to fetch run result: not found: run not found"]);
    }

    #[tokio::test]
    async fn stream_error_is_logged_and_close_still_finalizes() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("completed")]);
        let connector = FakeConnector::with(vec![Ok(vec![
            StreamNotice::Opened,
            StreamNotice::Error("connection reset".into()),
            StreamNotice::Closed,
        ])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        assert_eq!(messages(&controller), vec!["Stream error: connection reset", "Workflow completed."]);
        assert_eq!(controller.session().status(), RunStatus::Success);
    }

    #[tokio::test]
    async fn connect_failure_reports_error_then_finalizes() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("error")]);
        let connector = FakeConnector::with(vec![Err("refused".into())]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        let logs = messages(&controller);
        assert_eq!(logs.len(), 2);
        assert!(logs[0].starts_with("Stream error: invalid stream request"));
        assert_eq!(logs[1], "Workflow failed. Status: error");
    }

    #[tokio::test]
    async fn variable_changes_and_unrecognised_messages() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("completed")]);
        let connector = FakeConnector::with(vec![Ok(vec![
            StreamNotice::Opened,
            step_start("s1", "Login"),
            StreamNotice::Unrecognized("unknown stream message type 'heartbeat'".into()),
            StreamNotice::Event(StreamEvent::VariableChange(VariableChangePayload {
                step_id: "s1".into(),
                change_type: VariableChangeType::Update,
                var_name: "token".into(),
                old_value: None,
                new_value: serde_json::json!({"id": 7}),
            })),
            StreamNotice::Closed,
        ])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        let first = &controller.logs().entries()[0];
        assert_eq!(first.message, r#"Variable update: token = {"id":7}"#);
        assert_eq!(first.level, LogLevel::Debug);
        assert_eq!(first.step_name.as_deref(), Some("Login"));
        assert_eq!(controller.logs().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_deliveries_are_passed_through() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("completed")]);
        let connector = FakeConnector::with(vec![Ok(vec![
            StreamNotice::Opened,
            step_log("s1", LogLevel::Info, "hit endpoint"),
            step_log("s1", LogLevel::Info, "hit endpoint"),
            StreamNotice::Closed,
        ])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, terminal).await;

        assert_eq!(messages(&controller), vec!["hit endpoint", "hit endpoint", "Workflow completed."]);
        assert_eq!(controller.logs().entries()[0].step_name, None);
    }

    #[tokio::test]
    async fn start_is_refused_while_pending_or_running() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![]);
        let connector = FakeConnector::with(vec![Ok(vec![StreamNotice::Opened])]);
        let (mut controller, mut inbox) = RunController::new(backend.clone(), connector);

        controller.start("wf-1", JsonMap::new()).unwrap();
        assert_eq!(controller.start("wf-1", JsonMap::new()), Err(RunError::StartPending));

        pump_until(&mut controller, &mut inbox, |controller| controller.is_live()).await;
        assert_eq!(controller.start("wf-1", JsonMap::new()), Err(RunError::AlreadyRunning));
        assert!(!controller.can_start());
        assert_eq!(backend.execute_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_discards_late_results() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![]);
        let connector = FakeConnector::with(vec![]);
        let (mut controller, mut inbox) = RunController::new(backend, connector.clone());

        controller.start("wf-1", JsonMap::new()).unwrap();
        controller.shutdown();
        let message = timeout(Duration::from_secs(5), inbox.recv()).await.unwrap().unwrap();

        assert_eq!(controller.apply(message), None);
        assert_eq!(controller.session().status(), RunStatus::Idle);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!controller.can_start());
    }

    #[tokio::test]
    async fn shutdown_disconnects_an_open_stream() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![finished("completed")]);
        let connector = FakeConnector::with(vec![Ok(vec![StreamNotice::Opened, step_start("s1", "Login")])]);
        let (mut controller, mut inbox) = RunController::new(backend.clone(), connector.clone());

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, |controller| !controller.steps().is_empty()).await;
        let stream_sender = connector.last_sender().unwrap();

        controller.shutdown();
        assert!(!controller.is_live());
        timeout(Duration::from_secs(5), stream_sender.closed()).await.expect("stream disconnected");
        assert!(stream_sender.send(StreamNotice::Closed).await.is_err());
        assert_eq!(controller.session().status(), RunStatus::Running);
        assert_eq!(backend.get_run_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finalization_after_stop_changes_nothing() {
        let backend = FakeBackend::with(vec![started("run-1")], vec![]);
        let connector = FakeConnector::with(vec![Ok(vec![StreamNotice::Opened])]);
        let (mut controller, mut inbox) = RunController::new(backend, connector);
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completions);
        controller.set_on_complete(Box::new(move |_: &RunOutcome| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        controller.start("wf-1", JsonMap::new()).unwrap();
        pump_until(&mut controller, &mut inbox, |controller| controller.is_live()).await;
        assert!(controller.stop());
        let log_count = controller.logs().len();

        let late = RunMessage::Finalized {
            attempt: controller.attempt,
            result: finished("completed"),
        };
        assert_eq!(controller.apply(late), None);
        assert_eq!(controller.session().status(), RunStatus::Running);
        assert!(controller.session().is_stopped());
        assert_eq!(controller.logs().len(), log_count);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn results_of_previous_attempts_are_ignored() {
        let backend = FakeBackend::with(vec![Err(ApiError::Server("first".into())), started("run-2")], vec![]);
        let (mut controller, _inbox) = RunController::new(backend, FakeConnector::with(vec![]));

        controller.start("wf-1", JsonMap::new()).unwrap();
        let stale = RunMessage::Started {
            attempt: 0,
            result: started("stale"),
        };
        assert_eq!(controller.apply(stale), None);
        assert_eq!(controller.session().run_id(), None);

        let foreign = RunMessage::Stream {
            attempt: 1,
            stream_id: 42,
            notice: step_start("s1", "Login"),
        };
        controller.apply(foreign);
        assert!(controller.steps().is_empty());
    }
}
