// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controller poll loop
//!
//! [`ControlLoop`] owns the transport and the [`ControlState`]. It waits on
//! two sources: operator commands arriving on an mpsc channel and the poll
//! interval. Commands always win a race with the tick so a key press is
//! reflected by the very next poll.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use super::probe::send_diagnostic_probe;
use super::state::{
    pump_label, valve_label, ActivationTransition, ControlDecision, ControlState,
    OperatorCommand, TankReading,
};
use super::transport::{TankTransport, TransportError};
use crate::modbus::{LEVEL_REGISTER, PUMP_COIL, VALVE_COIL};

/// Why the control loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    Interrupted,
    ReadFailure,
}

impl std::fmt::Display for LoopExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopExit::Quit => write!(f, "Exit received"),
            LoopExit::Interrupted => write!(f, "Interrupted, exiting"),
            LoopExit::ReadFailure => write!(f, "Read error, exiting"),
        }
    }
}

/// Result of handling one operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlow {
    Continue,
    /// A probe went out: the next poll cycle is skipped and restarts the
    /// poll period
    SkipPoll,
    Exit(LoopExit),
}

/// One completed poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub reading: TankReading,
    pub decision: ControlDecision,
    pub activation: Option<ActivationTransition>,
}

pub struct ControlLoop<T: TankTransport> {
    transport: T,
    state: ControlState,
    poll_interval: Duration,
    skip_next_poll: bool,
}

impl<T: TankTransport> ControlLoop<T> {
    pub fn new(transport: T, poll_interval: Duration) -> Self {
        Self {
            transport,
            state: ControlState::new(),
            poll_interval,
            skip_next_poll: false,
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the next poll tick will be consumed by a pending probe
    pub fn skip_pending(&self) -> bool {
        self.skip_next_poll
    }

    /// Give the transport back, typically to disconnect it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Apply one operator command
    pub async fn handle_command(&mut self, command: OperatorCommand) -> CommandFlow {
        match command {
            OperatorCommand::Quit => {
                info!("{}", LoopExit::Quit);
                CommandFlow::Exit(LoopExit::Quit)
            }
            OperatorCommand::Interrupt => {
                info!("{}", LoopExit::Interrupted);
                CommandFlow::Exit(LoopExit::Interrupted)
            }
            OperatorCommand::Probe => match send_diagnostic_probe(&mut self.transport).await {
                Ok(drained) => {
                    info!("Diagnostic probe sent, skipping next poll");
                    debug!("{} stale bytes drained after probe", drained);
                    self.skip_next_poll = true;
                    CommandFlow::SkipPoll
                }
                Err(err) => {
                    error!("Diagnostic probe failed: {}", err);
                    CommandFlow::Continue
                }
            },
            other => {
                self.state.apply(other);
                CommandFlow::Continue
            }
        }
    }

    /// Read the tank, update the latch and issue the coil writes
    pub async fn poll_once(&mut self) -> Result<PollReport, TransportError> {
        let registers = self
            .transport
            .read_holding_registers(LEVEL_REGISTER, 1)
            .await?;
        let coils = self.transport.read_coils(PUMP_COIL, 2).await?;

        let level = *registers.first().ok_or(TransportError::Malformed {
            what: "holding register",
            expected: 1,
            received: 0,
        })?;
        if coils.len() < 2 {
            return Err(TransportError::Malformed {
                what: "coil",
                expected: 2,
                received: coils.len(),
            });
        }
        let reading = TankReading {
            level,
            pump_on: coils[0],
            valve_open: coils[1],
        };

        let activation = self.state.activation_a.update(level);
        match activation {
            Some(ActivationTransition::Activated) => info!("Activation A: ACTIVATED"),
            Some(ActivationTransition::Deactivated) => info!("Activation A: DEACTIVATED"),
            None => {}
        }

        let decision = self.state.decide(&reading);
        if let Some(target) = decision.pump_write {
            match self.transport.write_coil(PUMP_COIL, target).await {
                Ok(()) => info!("Pump set to {}", pump_label(target)),
                Err(err) => error!("Failed to set pump to {}: {}", pump_label(target), err),
            }
        }
        if let Some(target) = decision.valve_write {
            match self.transport.write_coil(VALVE_COIL, target).await {
                Ok(()) => info!("Valve set to {}", valve_label(target)),
                Err(err) => error!("Failed to set valve to {}: {}", valve_label(target), err),
            }
        }

        info!(
            "Level={} Pump={} Valve={}",
            level,
            pump_label(decision.pump_target),
            valve_label(decision.valve_state(&reading))
        );

        Ok(PollReport {
            reading,
            decision,
            activation,
        })
    }

    /// Handle one poll tick, consuming a pending probe skip if there is one
    pub async fn on_tick(&mut self) -> Result<Option<PollReport>, TransportError> {
        if self.skip_next_poll {
            self.skip_next_poll = false;
            match self.transport.drain_pending() {
                Ok(drained) => debug!("Poll skipped after probe, {} bytes drained", drained),
                Err(err) => warn!("Drain after probe failed: {}", err),
            }
            return Ok(None);
        }
        self.poll_once().await.map(Some)
    }

    /// Run until quit, interrupt or a failed read.
    ///
    /// The first poll happens immediately. After a probe the poll period
    /// restarts, so the skipped cycle lasts one full interval and the probe
    /// response has arrived by the time it is drained. A closed command
    /// channel leaves the loop polling until another exit condition occurs.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<OperatorCommand>) -> LoopExit {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut input_open = true;

        loop {
            tokio::select! {
                biased;

                command = commands.recv(), if input_open => match command {
                    Some(command) => match self.handle_command(command).await {
                        CommandFlow::Continue => {}
                        CommandFlow::SkipPoll => ticker.reset(),
                        CommandFlow::Exit(exit) => return exit,
                    },
                    None => {
                        debug!("Operator input closed");
                        input_open = false;
                    }
                },
                _ = ticker.tick() => match self.on_tick().await {
                    Ok(_) => {}
                    Err(err @ TransportError::Malformed { what: "coil", .. }) => {
                        error!("Invalid coil response received, exiting ({})", err);
                        return LoopExit::ReadFailure;
                    }
                    Err(err) => {
                        error!("{}: {}", LoopExit::ReadFailure, err);
                        return LoopExit::ReadFailure;
                    }
                },
            }
        }
    }
}
