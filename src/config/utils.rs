// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;

/// JSON schema embedded in the binaries
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./tank_simulator --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against rules the JSON schema cannot express
/// or that must also hold after command line overrides.
///
/// # Validation Rules
///
/// - **Port Range**: simulator and controller ports are within 1-65534
/// - **Bind Address**: the simulator address is an IP address or `localhost`
/// - **Controller Host**: not empty
/// - **Poll Interval**: at least one millisecond
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    for (section, port) in [
        ("simulator", config.simulator.port),
        ("controller", config.controller.port),
    ] {
        if !(1..=65534).contains(&port) {
            anyhow::bail!("Invalid {} port number: {}", section, port);
        }
    }

    if !is_valid_ip_address(&config.simulator.address) {
        anyhow::bail!(
            "Invalid simulator bind address: {}",
            config.simulator.address
        );
    }

    if config.controller.host.trim().is_empty() {
        anyhow::bail!("Controller host must not be empty");
    }

    if config.controller.poll_interval_ms == 0 {
        anyhow::bail!("Controller poll interval must be at least 1 ms");
    }

    if config.controller.slave_id != config.simulator.unit_id {
        warn!(
            "Controller addresses unit {} while the simulator announces unit {}",
            config.controller.slave_id, config.simulator.unit_id
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_addresses() {
        assert!(is_valid_ip_address("127.0.0.1"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("tank.local"));
        assert!(!is_valid_ip_address("300.1.1.1"));
    }

    #[test]
    fn test_default_config_passes_rules() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_rules_reject_bad_values() {
        let mut config = Config::default();
        config.simulator.port = 65535;
        assert!(validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.simulator.address = "not an address".to_string();
        assert!(validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.controller.poll_interval_ms = 0;
        assert!(validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.controller.host = String::new();
        assert!(validate_specific_rules(&config).is_err());
    }
}
