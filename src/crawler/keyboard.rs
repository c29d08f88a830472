//! Interactive stage control from the terminal
//!
//! `e` moves a downloading run to extraction, `q` (or Ctrl-C, since raw
//! mode swallows the signal) terminates it. The listener only ever writes
//! to the `StageController`.

use crate::state::StageController;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Applies one key event to the stage
///
/// Returns true if the event changed the stage.
pub fn handle_key(event: &KeyEvent, stage: &StageController) -> bool {
    if event.kind != KeyEventKind::Press {
        return false;
    }

    match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => stage.terminate(),
        KeyCode::Char('q') | KeyCode::Char('Q') => stage.terminate(),
        KeyCode::Char('e') | KeyCode::Char('E') if stage.is_downloading() => {
            stage.request_extracting()
        }
        _ => false,
    }
}

/// Running keyboard listener
pub struct ListenerHandle {
    done: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops the listener and restores the terminal
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Keyboard listener panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts listening for key presses on a dedicated thread
///
/// Without a terminal (piped stdin, CI) the listener logs once and exits;
/// the run then only reacts to the image limit.
pub fn spawn_listener(stage: Arc<StageController>) -> std::io::Result<ListenerHandle> {
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);

    let thread = std::thread::Builder::new()
        .name("keyboard".to_string())
        .spawn(move || {
            if let Err(e) = listen(&stage, &flag) {
                tracing::warn!("Keyboard control unavailable: {}", e);
            }
        })?;

    Ok(ListenerHandle {
        done,
        thread: Some(thread),
    })
}

fn listen(stage: &StageController, done: &AtomicBool) -> std::io::Result<()> {
    let _raw = RawModeGuard::enable()?;

    while !done.load(Ordering::SeqCst) && !stage.is_terminated() {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                handle_key(&key, stage);
            }
        }
    }
    Ok(())
}

/// Keeps the terminal in raw mode for its lifetime
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
