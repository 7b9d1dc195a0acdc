// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared coil and holding register bank
//!
//! The tank simulator and the Modbus service both mutate the same bank from
//! different tasks. A single mutex covers coils and holding registers so every
//! call, including multi-value reads and writes, is observed as a whole.

use std::sync::{Mutex, MutexGuard};

use log::error;
use thiserror::Error;

/// Coil address of the pump actuator (ON/OFF)
pub const PUMP_COIL: u16 = 0;

/// Coil address of the drain valve actuator (OPEN/CLOSED)
pub const VALVE_COIL: u16 = 1;

/// Holding register address of the tank level sensor
pub const LEVEL_REGISTER: u16 = 0;

/// Number of coils exposed by the simulated device
pub const COIL_COUNT: usize = 20;

/// Number of holding registers exposed by the simulated device
pub const HOLDING_REGISTER_COUNT: usize = 20;

/// Tank level the store is seeded with
pub const INITIAL_LEVEL: u16 = 500;

/// Errors raised by [`RegisterStore`] accesses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterStoreError {
    #[error("{bank} range {start}..{end} is outside 0..{size}")]
    OutOfRange {
        bank: &'static str,
        start: usize,
        end: usize,
        size: usize,
    },
}

#[derive(Debug)]
struct Banks {
    coils: Vec<bool>,
    holding_registers: Vec<u16>,
}

/// Thread-safe register bank of the simulated tank device.
///
/// Wrap it in an `Arc` to share it between the simulation task and the
/// Modbus connections.
#[derive(Debug)]
pub struct RegisterStore {
    banks: Mutex<Banks>,
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterStore {
    /// Create the store with the device layout: every coil off, the level
    /// register at [`INITIAL_LEVEL`] and the remaining registers at zero.
    pub fn new() -> Self {
        let mut holding_registers = vec![0; HOLDING_REGISTER_COUNT];
        holding_registers[LEVEL_REGISTER as usize] = INITIAL_LEVEL;
        Self::with_banks(vec![false; COIL_COUNT], holding_registers)
    }

    /// Create a store from explicit bank contents
    pub fn with_banks(coils: Vec<bool>, holding_registers: Vec<u16>) -> Self {
        Self {
            banks: Mutex::new(Banks {
                coils,
                holding_registers,
            }),
        }
    }

    /// Read `count` coils starting at `start`
    pub fn read_coils(&self, start: u16, count: u16) -> Result<Vec<bool>, RegisterStoreError> {
        let banks = self.lock();
        let range = checked_range("coil", start, count as usize, banks.coils.len())?;
        Ok(banks.coils[range].to_vec())
    }

    /// Read `count` holding registers starting at `start`
    pub fn read_holding_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RegisterStoreError> {
        let banks = self.lock();
        let range = checked_range(
            "holding register",
            start,
            count as usize,
            banks.holding_registers.len(),
        )?;
        Ok(banks.holding_registers[range].to_vec())
    }

    /// Write a single coil
    pub fn write_coil(&self, index: u16, value: bool) -> Result<(), RegisterStoreError> {
        self.write_coils(index, std::slice::from_ref(&value))
    }

    /// Write consecutive coils starting at `start`
    pub fn write_coils(&self, start: u16, values: &[bool]) -> Result<(), RegisterStoreError> {
        let mut banks = self.lock();
        let range = checked_range("coil", start, values.len(), banks.coils.len())?;
        banks.coils[range].copy_from_slice(values);
        Ok(())
    }

    /// Write a single holding register
    pub fn write_holding_register(&self, index: u16, value: u16) -> Result<(), RegisterStoreError> {
        self.write_holding_registers(index, std::slice::from_ref(&value))
    }

    /// Write consecutive holding registers starting at `start`
    pub fn write_holding_registers(
        &self,
        start: u16,
        values: &[u16],
    ) -> Result<(), RegisterStoreError> {
        let mut banks = self.lock();
        let range = checked_range(
            "holding register",
            start,
            values.len(),
            banks.holding_registers.len(),
        )?;
        banks.holding_registers[range].copy_from_slice(values);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Banks> {
        // A panic while holding the guard cannot leave a bank half-written:
        // every mutation is a single copy_from_slice.
        self.banks.lock().unwrap_or_else(|poisoned| {
            error!("Register store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn checked_range(
    bank: &'static str,
    start: u16,
    count: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, RegisterStoreError> {
    let start = start as usize;
    let end = start + count;
    if end > size {
        return Err(RegisterStoreError::OutOfRange {
            bank,
            start,
            end,
            size,
        });
    }
    Ok(start..end)
}
