// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tank process simulation
//!
//! The simulator advances the physical model once per second. It reads the
//! pump and valve coils from the shared [`RegisterStore`], computes the new
//! level and writes it back to holding register 0, announcing the empty,
//! half-full and full thresholds once per entry.
//!
//! The loop has no cancellation path of its own: it lives as long as the
//! process and is aborted together with the daemon tasks on shutdown.

pub mod tank;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio::time::{self, MissedTickBehavior};

use crate::modbus::{RegisterStore, RegisterStoreError, LEVEL_REGISTER, PUMP_COIL};

pub use tank::{
    level_delta, next_level, TankState, ThresholdReport, DRAIN_RATE, MAX_LEVEL, MIN_LEVEL,
    PUMP_RATE,
};

/// Period of the physical simulation
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub level: u16,
    pub pump_on: bool,
    pub valve_open: bool,
    pub threshold: Option<ThresholdReport>,
}

impl TickOutcome {
    /// Log line announcing a threshold crossed by this step
    pub fn threshold_message(&self) -> Option<String> {
        self.threshold
            .map(|report| format!("{} – level = {}", report, self.level))
    }
}

/// Simulation loop driving the tank level in the shared register store
pub struct TankSimulator {
    store: Arc<RegisterStore>,
    state: TankState,
}

impl TankSimulator {
    /// Create a simulator over `store`, seeding its state from the level
    /// register when readable
    pub fn new(store: Arc<RegisterStore>) -> Self {
        let level = store
            .read_holding_registers(LEVEL_REGISTER, 1)
            .ok()
            .and_then(|regs| regs.first().copied())
            .unwrap_or(crate::modbus::INITIAL_LEVEL);
        Self {
            store,
            state: TankState::new(level),
        }
    }

    /// Current simulation state
    pub fn state(&self) -> &TankState {
        &self.state
    }

    /// Perform one simulation step against the register store
    pub fn tick(&mut self) -> Result<TickOutcome, RegisterStoreError> {
        let coils = self.store.read_coils(PUMP_COIL, 2)?;
        let (pump_on, valve_open) = (coils[0], coils[1]);
        let level = self.store.read_holding_registers(LEVEL_REGISTER, 1)?[0];

        let new_level = next_level(level, pump_on, valve_open);
        self.store.write_holding_register(LEVEL_REGISTER, new_level)?;

        self.state.pump_on = pump_on;
        self.state.valve_open = valve_open;
        let threshold = self.state.observe_level(new_level);

        Ok(TickOutcome {
            level: new_level,
            pump_on,
            valve_open,
            threshold,
        })
    }

    /// Run the simulation forever at [`TICK_INTERVAL`].
    ///
    /// Returns only if the register store rejects an access, which means the
    /// register layout is broken.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = match self.tick() {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!("Tank simulation stopped: {}", err);
                    return Err(err.into());
                }
            };

            info!(
                "Pump={} Valve={} Level={}",
                if outcome.pump_on { "ON" } else { "OFF" },
                if outcome.valve_open { "OPEN" } else { "CLOSED" },
                outcome.level
            );
            if let Some(message) = outcome.threshold_message() {
                info!("{}", message);
            }
        }
    }
}
