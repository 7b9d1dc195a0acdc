// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tank controller (Modbus client side)
//!
//! - `state`: operator flags, Activation-A latch and the pump/valve policy
//! - `transport`: Modbus TCP connection with raw frame access
//! - `probe`: diagnostic frame
//! - `control_loop`: the poll loop selecting between commands and ticks
//! - `keyboard`: raw-mode key reader feeding the loop

pub mod control_loop;
pub mod keyboard;
pub mod probe;
pub mod state;
pub mod transport;

pub use control_loop::{CommandFlow, ControlLoop, LoopExit, PollReport};
pub use probe::{send_diagnostic_probe, DIAGNOSTIC_FRAME};
pub use state::{
    ActivationLatch, ActivationTransition, ControlDecision, ControlState, OperatorCommand,
    TankReading,
};
pub use transport::{ModbusTcpTransport, TankTransport, TransportError};
