// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control decision state machine
//!
//! Holds the operator flags (automatic mode, pump and valve overrides), the
//! Activation-A latch and the pump/valve decision policy. Everything here is
//! synchronous and free of I/O; the control loop feeds it readings and
//! applies the resulting coil writes.

use std::ops::RangeInclusive;

use log::info;

/// Level window that arms Activation-A
pub const ACTIVATION_A_WINDOW: RangeInclusive<u16> = 500..=520;

/// Poll ticks Activation-A stays active, the activating tick included
pub const ACTIVATION_A_TICKS: u32 = 5;

/// Automatic mode starts the pump below this level
pub const PUMP_ON_BELOW: u16 = 300;

/// Automatic mode stops the pump above this level
pub const PUMP_OFF_ABOVE: u16 = 700;

/// Commands an operator can issue from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// `a`: toggle automatic control
    ToggleAuto,
    /// `p`: leave automatic mode and toggle the pump override
    TogglePump,
    /// `v`: toggle the valve override
    ToggleValve,
    /// `f`: pump on, valve closed
    ForceFill,
    /// `d`: pump off, valve open
    ForceDrain,
    /// `t`: send the diagnostic probe frame
    Probe,
    /// `q`: leave the control loop
    Quit,
    /// Ctrl+C or SIGINT
    Interrupt,
}

impl OperatorCommand {
    /// Map a console key to its command, ignoring case
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'a' => Some(Self::ToggleAuto),
            'p' => Some(Self::TogglePump),
            'v' => Some(Self::ToggleValve),
            'f' => Some(Self::ForceFill),
            'd' => Some(Self::ForceDrain),
            't' => Some(Self::Probe),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Activation-A latch transition reported by [`ActivationLatch::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTransition {
    Activated,
    Deactivated,
}

/// Two-state latch armed by the level entering [`ACTIVATION_A_WINDOW`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationLatch {
    #[default]
    Inactive,
    Active {
        ticks_remaining: u32,
    },
}

impl ActivationLatch {
    pub fn is_active(&self) -> bool {
        matches!(self, ActivationLatch::Active { .. })
    }

    /// Ticks left before the latch releases, zero when inactive
    pub fn ticks_remaining(&self) -> u32 {
        match self {
            ActivationLatch::Inactive => 0,
            ActivationLatch::Active { ticks_remaining } => *ticks_remaining,
        }
    }

    /// Advance the latch by one poll tick.
    ///
    /// An inactive latch arms when `level` is inside the window. An active
    /// latch counts down regardless of the level and releases when the count
    /// reaches zero. The window is not checked while active.
    pub fn update(&mut self, level: u16) -> Option<ActivationTransition> {
        let mut transition = None;

        if !self.is_active() && ACTIVATION_A_WINDOW.contains(&level) {
            *self = ActivationLatch::Active {
                ticks_remaining: ACTIVATION_A_TICKS,
            };
            transition = Some(ActivationTransition::Activated);
        }

        if let ActivationLatch::Active { ticks_remaining } = self {
            *ticks_remaining = ticks_remaining.saturating_sub(1);
            if *ticks_remaining == 0 {
                *self = ActivationLatch::Inactive;
                transition = Some(ActivationTransition::Deactivated);
            }
        }

        transition
    }
}

/// Sensor and actuator values read during one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankReading {
    pub level: u16,
    pub pump_on: bool,
    pub valve_open: bool,
}

/// Outcome of the pump and valve policy for one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDecision {
    /// Pump state the controller wants
    pub pump_target: bool,
    /// Pump coil write to issue, set only when the target differs
    pub pump_write: Option<bool>,
    /// Valve coil write to issue, set only for a differing override
    pub valve_write: Option<bool>,
}

impl ControlDecision {
    /// Valve state once the decision has been applied
    pub fn valve_state(&self, reading: &TankReading) -> bool {
        self.valve_write.unwrap_or(reading.valve_open)
    }
}

/// Operator flags and latch owned by the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub auto_control: bool,
    pub pump_override: Option<bool>,
    pub valve_override: Option<bool>,
    pub activation_a: ActivationLatch,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            auto_control: true,
            pump_override: None,
            valve_override: None,
            activation_a: ActivationLatch::Inactive,
        }
    }
}

fn toggle(value: Option<bool>) -> Option<bool> {
    Some(value.map_or(true, |current| !current))
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

fn open_closed(value: bool) -> &'static str {
    if value {
        "OPEN"
    } else {
        "CLOSED"
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operator command to the flags.
    ///
    /// `Probe`, `Quit` and `Interrupt` carry no state change and are handled
    /// by the control loop.
    pub fn apply(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::ToggleAuto => {
                self.auto_control = !self.auto_control;
                if self.auto_control {
                    self.pump_override = None;
                }
                info!("Auto control {}", on_off(self.auto_control));
            }
            OperatorCommand::TogglePump => {
                self.auto_control = false;
                self.pump_override = toggle(self.pump_override);
                info!("Pump override {}", on_off(self.pump_override == Some(true)));
            }
            OperatorCommand::ToggleValve => {
                self.valve_override = toggle(self.valve_override);
                info!(
                    "Valve override {}",
                    open_closed(self.valve_override == Some(true))
                );
            }
            OperatorCommand::ForceFill => {
                self.auto_control = false;
                self.pump_override = Some(true);
                self.valve_override = Some(false);
                info!("Force FILL: Pump ON, Valve CLOSED");
            }
            OperatorCommand::ForceDrain => {
                self.auto_control = false;
                self.pump_override = Some(false);
                self.valve_override = Some(true);
                info!("Force DRAIN: Pump OFF, Valve OPEN");
            }
            OperatorCommand::Probe | OperatorCommand::Quit | OperatorCommand::Interrupt => {}
        }
    }

    /// Pump state wanted for `reading`: override, then automatic band, then hold
    pub fn pump_target(&self, reading: &TankReading) -> bool {
        if let Some(forced) = self.pump_override {
            forced
        } else if self.auto_control {
            if reading.level < PUMP_ON_BELOW {
                true
            } else if reading.level > PUMP_OFF_ABOVE {
                false
            } else {
                reading.pump_on
            }
        } else {
            reading.pump_on
        }
    }

    /// Decide the coil writes for `reading`
    pub fn decide(&self, reading: &TankReading) -> ControlDecision {
        let pump_target = self.pump_target(reading);
        let pump_write = (pump_target != reading.pump_on).then_some(pump_target);
        let valve_write = self
            .valve_override
            .filter(|wanted| *wanted != reading.valve_open);

        ControlDecision {
            pump_target,
            pump_write,
            valve_write,
        }
    }
}

/// Human-readable pump state
pub fn pump_label(on: bool) -> &'static str {
    on_off(on)
}

/// Human-readable valve state
pub fn valve_label(open: bool) -> &'static str {
    open_closed(open)
}
