//! Keyboard cancel for the acquisition loop.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::debug;

use crate::acquire::CancelSource;

/// Watches the terminal for Esc (or Ctrl-C) while a run is acquired.
///
/// Raw mode is held for the guard's lifetime so single key presses arrive
/// without Enter. When stdin is not a terminal the guard never fires.
pub struct EscapeKey {
    raw: bool,
}

impl EscapeKey {
    #[must_use]
    pub fn watch() -> Self {
        match terminal::enable_raw_mode() {
            Ok(()) => Self { raw: true },
            Err(err) => {
                debug!("keys: raw mode unavailable: {err}");
                Self { raw: false }
            }
        }
    }
}

impl CancelSource for EscapeKey {
    fn cancel_requested(&mut self) -> bool {
        if !self.raw {
            return false;
        }

        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    debug!("keys: poll failed: {err}");
                    return false;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if is_cancel(&key) => return true,
                Ok(_) => {}
                Err(err) => {
                    debug!("keys: read failed: {err}");
                    return false;
                }
            }
        }
    }
}

impl Drop for EscapeKey {
    fn drop(&mut self) {
        if self.raw
            && let Err(err) = terminal::disable_raw_mode()
        {
            debug!("keys: failed to leave raw mode: {err}");
        }
    }
}

fn is_cancel(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
