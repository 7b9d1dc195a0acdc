// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tank simulator configuration
//!
//! This module defines the structures for configuring the Modbus TCP server
//! of the tank simulator.

use serde::{Deserialize, Serialize};

/// Identification strings of the simulated device.
///
/// They are logged at startup and have no effect on the served registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub vendor_name: String,
    pub product_code: String,
    pub product_name: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_name: "SuricataLab".to_string(),
            product_code: "TANK".to_string(),
            product_name: "TankSimulator".to_string(),
        }
    }
}

/// Configuration for the tank simulator Modbus TCP server.
///
/// # Fields
///
/// * `address` - Network address the server binds to (default: 127.0.0.1)
/// * `port` - TCP port number (default: 5020)
/// * `unit_id` - Modbus unit identifier of the device (default: 1)
/// * `identity` - Device identification strings
///
/// # Example
///
/// ```
/// use rust_tank_control::config::SimulatorConfig;
///
/// let simulator = SimulatorConfig {
///     address: "0.0.0.0".to_string(),
///     port: 1502,
///     ..Default::default()
/// };
/// assert_eq!(simulator.socket_address(), "0.0.0.0:1502");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// The network address the Modbus server will bind to.
    ///
    /// Use "0.0.0.0" to accept controllers from other hosts.
    pub address: String,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Valid range is 1-65534. The default avoids the privileged port 502.
    pub port: u16,

    /// Unit identifier announced by the device
    pub unit_id: u8,

    pub identity: DeviceIdentity,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5020,
            unit_id: 1,
            identity: DeviceIdentity::default(),
        }
    }
}

impl SimulatorConfig {
    /// `address:port` string suitable for binding
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
