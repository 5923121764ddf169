//! Application state for the run console.
//!
//! [`App`] owns the [`RunController`] plus everything that only exists for
//! presentation: the log filter, scroll position, follow mode and a one-line
//! notice for refused actions. Keys are translated into controller calls
//! here; rendering reads the state back in `ui::view`.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use testbench_engine::{LogFilter, RunController, RunMessage, RunOutcome, StepFilter};
use tracing::debug;

use crate::RunRequest;

/// Lines moved by PgUp/PgDn.
const PAGE_STEP: usize = 10;

/// Whether the event loop should keep going after a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

#[derive(Debug)]
pub struct App {
    controller: RunController,
    request: RunRequest,
    pub filter: LogFilter,
    /// Keep the log panel pinned to the newest line.
    pub follow: bool,
    /// First visible log line.
    pub scroll: usize,
    /// Largest valid `scroll`, refreshed by the view on every draw.
    pub max_scroll: usize,
    pub notice: Option<String>,
    last_outcome: Option<RunOutcome>,
}

impl App {
    pub fn new(controller: RunController, request: RunRequest) -> Self {
        Self {
            controller,
            request,
            filter: LogFilter::default(),
            follow: true,
            scroll: 0,
            max_scroll: 0,
            notice: None,
            last_outcome: None,
        }
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<RunOutcome> {
        self.last_outcome.clone()
    }

    /// True while ticks should redraw (elapsed time moves).
    pub fn is_animating(&self) -> bool {
        self.controller.session().is_running() || self.controller.is_start_pending()
    }

    /// Starts (or retries) the run. A refusal becomes the notice line.
    pub fn start(&mut self) {
        let workflow_id = self.request.workflow_id.clone();
        match self.controller.start(&workflow_id, self.request.variables.clone()) {
            Ok(()) => {
                // The log was reset, so a step filter may point at a step that no longer exists.
                self.filter.step = StepFilter::All;
                self.follow = true;
                self.scroll = 0;
                self.last_outcome = None;
            }
            Err(error) => self.notice = Some(error.to_string()),
        }
    }

    pub fn apply(&mut self, message: RunMessage) {
        if let Some(outcome) = self.controller.apply(message) {
            debug!(run_id = ?outcome.run_id, status = %outcome.status, "run finished");
            self.last_outcome = Some(outcome);
        }
    }

    /// Disconnects the stream and ignores everything still in flight.
    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Control {
        self.notice = None;
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Control::Quit,
                _ => Control::Continue,
            };
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Control::Quit,
            KeyCode::Char('s') => self.start(),
            KeyCode::Char('x') => {
                if !self.controller.stop() {
                    self.notice = Some("Nothing is running".to_string());
                }
            }
            KeyCode::Char('l') => self.filter.level = self.filter.level.next(),
            KeyCode::Char('t') => {
                let options = self.controller.logs().steps();
                self.filter.step = self.filter.step.next(&options);
            }
            KeyCode::Char('c') => {
                if self.controller.clear_logs() {
                    self.scroll = 0;
                    self.max_scroll = 0;
                }
            }
            KeyCode::Char('f') => self.follow = !self.follow,
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(PAGE_STEP),
            KeyCode::PageDown => self.scroll_down(PAGE_STEP),
            KeyCode::Home => self.scroll_up(usize::MAX),
            KeyCode::End => self.follow = true,
            _ => {}
        }
        Control::Continue
    }

    fn scroll_up(&mut self, lines: usize) {
        if self.follow {
            self.scroll = self.max_scroll;
            self.follow = false;
        }
        self.scroll = self.scroll.saturating_sub(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        if self.follow {
            return;
        }
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll);
        if self.scroll == self.max_scroll {
            self.follow = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Map as JsonMap, Value};
    use testbench_api::{ApiError, RunSubscription, StreamError};
    use testbench_engine::{ExecutionBackend, LevelFilter, StreamConnector};
    use testbench_types::{LogLevel, RunStatus, WorkflowRunRecord};

    use super::*;

    struct OfflineBackend;

    #[async_trait]
    impl ExecutionBackend for OfflineBackend {
        async fn execute(&self, _workflow_id: &str, _variables: &JsonMap<String, Value>) -> Result<WorkflowRunRecord, ApiError> {
            Err(ApiError::Server("platform offline".to_string()))
        }

        async fn get_run(&self, _run_id: &str) -> Result<WorkflowRunRecord, ApiError> {
            Err(ApiError::Server("platform offline".to_string()))
        }
    }

    struct OfflineConnector;

    #[async_trait]
    impl StreamConnector for OfflineConnector {
        async fn connect(&self, run_id: &str) -> Result<RunSubscription, StreamError> {
            Err(StreamError::Request {
                url: format!("ws://offline/{run_id}"),
                reason: "offline".to_string(),
            })
        }
    }

    fn app() -> (App, testbench_engine::RunInbox) {
        let (controller, inbox) = RunController::new(Arc::new(OfflineBackend), Arc::new(OfflineConnector));
        let mut request = RunRequest::new("wf-1");
        request.workflow_name = Some("Checkout flow".to_string());
        (App::new(controller, request), inbox)
    }

    fn press(app: &mut App, code: KeyCode) -> Control {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn failed_start(app: &mut App, inbox: &mut testbench_engine::RunInbox) {
        assert_eq!(press(app, KeyCode::Char('s')), Control::Continue);
        let message = inbox.recv().await.unwrap();
        app.apply(message);
    }

    #[tokio::test]
    async fn start_failure_is_reported_as_outcome() {
        let (mut app, mut inbox) = app();
        failed_start(&mut app, &mut inbox).await;

        let outcome = app.last_outcome().unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.run_id.is_none());
        assert_eq!(app.controller().session().start_label(), "Retry");
        let entry = &app.controller().logs().entries()[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert!(entry.message.contains("platform offline"));
    }

    #[tokio::test]
    async fn second_start_while_pending_sets_notice() {
        let (mut app, _inbox) = app();
        press(&mut app, KeyCode::Char('s'));
        assert!(app.is_animating());
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.notice.as_deref(), Some("a start request is already pending"));
    }

    #[tokio::test]
    async fn clear_only_when_logs_exist() {
        let (mut app, mut inbox) = app();
        press(&mut app, KeyCode::Char('c'));
        assert!(app.controller().logs().is_empty());

        failed_start(&mut app, &mut inbox).await;
        assert!(!app.controller().logs().is_empty());
        press(&mut app, KeyCode::Char('c'));
        assert!(app.controller().logs().is_empty());
    }

    #[tokio::test]
    async fn stop_without_run_sets_notice() {
        let (mut app, _inbox) = app();
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.notice.as_deref(), Some("Nothing is running"));
        press(&mut app, KeyCode::Char('l'));
        assert!(app.notice.is_none());
    }

    #[tokio::test]
    async fn filter_keys_cycle() {
        let (mut app, mut inbox) = app();
        press(&mut app, KeyCode::Char('l'));
        assert_eq!(app.filter.level, LevelFilter::Only(LogLevel::Debug));

        failed_start(&mut app, &mut inbox).await;
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.filter.step, StepFilter::Only("system".to_string()));
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.filter.step, StepFilter::All);
    }

    #[tokio::test]
    async fn scrolling_up_leaves_follow_mode_and_bottom_restores_it() {
        let (mut app, _inbox) = app();
        app.max_scroll = 20;
        press(&mut app, KeyCode::Up);
        assert!(!app.follow);
        assert_eq!(app.scroll, 19);

        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.scroll, 9);
        press(&mut app, KeyCode::PageDown);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.scroll, 20);
        assert!(app.follow);

        press(&mut app, KeyCode::Char('f'));
        assert!(!app.follow);
    }

    #[tokio::test]
    async fn quit_keys() {
        let (mut app, _inbox) = app();
        assert_eq!(press(&mut app, KeyCode::Char('q')), Control::Quit);
        assert_eq!(press(&mut app, KeyCode::Esc), Control::Quit);
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Control::Quit
        );
    }
}
