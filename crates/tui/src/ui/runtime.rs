//! Runtime: terminal lifecycle and the unified event loop.
//!
//! Responsibilities
//! - Own the terminal lifecycle (enter/leave alternate screen, raw mode).
//! - Multiplex terminal input, run-controller messages, ticks and Ctrl+C in
//!   a single `tokio::select!` loop.
//! - Redraw only after something visible changed.
//!
//! Ticking is fast (100 ms) while a run is in flight so the elapsed time
//! moves, and slow (1 s) otherwise.

use std::{io::Stdout, sync::Arc, time::Duration};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, prelude::CrosstermBackend};
use testbench_engine::{ExecutionBackend, RunController, RunInbox, RunOutcome, StreamConnector};
use tokio::{
    signal,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    RunRequest,
    app::{App, Control},
    ui::{theme, view},
};

type ConsoleTerminal = Terminal<CrosstermBackend<Stdout>>;

const FAST_TICK: Duration = Duration::from_millis(100);
const IDLE_TICK: Duration = Duration::from_millis(1000);
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Spawn a blocking task that reads terminal input and forwards `crossterm`
/// events over a channel. It exits once the receiver is dropped.
fn spawn_input_thread() -> mpsc::Receiver<Event> {
    let (sender, receiver) = mpsc::channel(256);
    tokio::task::spawn_blocking(move || {
        while !sender.is_closed() {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(error) => {
                    warn!(%error, "failed to poll terminal input");
                    break;
                }
            }
            match event::read() {
                Ok(event) => {
                    if sender.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "failed to read terminal input");
                    break;
                }
            }
        }
    });
    receiver
}

/// Put the terminal into raw mode and enter the alternate screen.
fn setup_terminal() -> Result<ConsoleTerminal> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    Ok(terminal)
}

/// Restore terminal settings and leave the alternate screen.
fn cleanup_terminal(terminal: &mut ConsoleTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn new_ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Entry point for the console: sets up the terminal, runs the loop, and
/// always restores the terminal before returning.
pub async fn run_app(
    backend: Arc<dyn ExecutionBackend>,
    connector: Arc<dyn StreamConnector>,
    request: RunRequest,
) -> Result<Option<RunOutcome>> {
    let (controller, mut inbox) = RunController::new(backend, connector);
    let auto_start = request.auto_start;
    let mut app = App::new(controller, request);
    if auto_start {
        app.start();
    }

    let theme = theme::load();
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut app, &mut inbox, theme.as_ref()).await;

    app.shutdown();
    debug!(outcome = ?app.last_outcome(), "console closed");
    cleanup_terminal(&mut terminal)?;
    result?;
    Ok(app.into_outcome())
}

async fn event_loop(terminal: &mut ConsoleTerminal, app: &mut App, inbox: &mut RunInbox, theme: &dyn theme::Theme) -> Result<()> {
    let mut input_receiver = spawn_input_thread();
    let mut current_interval = IDLE_TICK;
    let mut ticker = new_ticker(current_interval);

    terminal.draw(|frame| view::draw(frame, app, theme))?;

    loop {
        let target_interval = if app.is_animating() { FAST_TICK } else { IDLE_TICK };
        if target_interval != current_interval {
            current_interval = target_interval;
            ticker = new_ticker(current_interval);
        }

        let mut needs_render = false;
        tokio::select! {
            maybe_event = input_receiver.recv() => {
                let Some(event) = maybe_event else {
                    debug!("input channel closed");
                    break;
                };
                match event {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if app.handle_key(key) == Control::Quit {
                            break;
                        }
                        needs_render = true;
                    }
                    Event::Resize(_, _) => needs_render = true,
                    _ => {}
                }
            }

            Some(message) = inbox.recv() => {
                app.apply(message);
                // Drain whatever else already arrived before drawing once.
                while let Some(message) = inbox.try_recv() {
                    app.apply(message);
                }
                needs_render = true;
            }

            _ = ticker.tick() => {
                needs_render = app.is_animating();
            }

            _ = signal::ctrl_c() => { break; }
        }

        if needs_render {
            terminal.draw(|frame| view::draw(frame, app, theme))?;
        }
    }
    Ok(())
}
