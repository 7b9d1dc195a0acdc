// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Operator keyboard input
//!
//! Single keys are read without echo or line buffering from a dedicated
//! thread and forwarded to the control loop as [`OperatorCommand`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::state::OperatorCommand;
use crate::utility::logging;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keeps the terminal in raw mode until dropped
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to switch the terminal to raw mode")?;
        logging::set_raw_console(true);
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        logging::set_raw_console(false);
        if let Err(err) = terminal::disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", err);
        }
    }
}

/// Command bound to a key event. Ctrl+C maps to an interrupt since raw mode
/// swallows the signal.
pub fn command_for_key(key: &KeyEvent) -> Option<OperatorCommand> {
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('C')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(OperatorCommand::Interrupt)
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            OperatorCommand::from_key(c)
        }
        _ => None,
    }
}

/// Spawn the input thread. It stops once `running` is cleared, the channel
/// closes or the terminal reports an error.
pub fn spawn_keyboard_reader(
    commands: mpsc::Sender<OperatorCommand>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            match event::poll(INPUT_POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!("Keyboard polling failed: {}", err);
                    break;
                }
            }

            let key = match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
                Ok(_) => continue,
                Err(err) => {
                    warn!("Keyboard read failed: {}", err);
                    break;
                }
            };

            let Some(command) = command_for_key(&key) else {
                continue;
            };
            // Keys typed while the loop is busy are dropped, not queued
            match commands.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    debug!("Dropping {:?}, control loop busy", command)
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        debug!("Keyboard reader stopped");
    })
}
