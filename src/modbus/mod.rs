// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the register bank of the simulated tank and the
//! Modbus TCP server exposing it, so that a controller can read the level
//! and drive the pump and valve over the network.
//!
//! ## Key Components
//!
//! - `RegisterStore`: coil and holding register bank shared by the simulation
//!   task and every Modbus connection.
//! - `TankModbusServer`: the per-connection Modbus service.
//! - `serve_tank`: accept loop binding both together.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_tank_control::modbus::{serve_tank, RegisterStore};
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(RegisterStore::new());
//! let listener = TcpListener::bind("127.0.0.1:5020").await?;
//! serve_tank(listener, store).await?;
//! # Ok(())
//! # }
//! ```

pub mod modbus_server;
pub mod register_store;

pub use modbus_server::{serve_tank, TankModbusServer};
pub use register_store::{
    RegisterStore, RegisterStoreError, COIL_COUNT, HOLDING_REGISTER_COUNT, INITIAL_LEVEL,
    LEVEL_REGISTER, PUMP_COIL, VALVE_COIL,
};
