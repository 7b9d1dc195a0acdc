// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Water tank simulator and controller over Modbus TCP
//!
//! - [`modbus`]: register store and Modbus server of the simulated tank
//! - [`simulation`]: physical model and one-second simulation loop
//! - [`control`]: controller state machine, transport and poll loop
//! - [`daemon`]: task manager of the simulator process
//! - [`config`]: YAML configuration shared by both binaries

pub mod config;
pub mod control;
pub mod daemon;
pub mod modbus;
pub mod simulation;
pub mod utility;
