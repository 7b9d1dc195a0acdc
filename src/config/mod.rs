// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the tank simulator and controller
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `simulator`: Modbus TCP server of the simulated tank
//! - `controller`: connection and polling settings of the controller
//!
//! Both binaries read the same file and use the section they need.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_tank_control::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()), // Simulator address
//!     Some(1502),                  // Simulator port
//!     None,                        // Controller host
//!     Some(1502),                  // Controller port
//!     None,                        // Slave id
//!     Some(500),                   // Poll interval (ms)
//!     None,                        // Log file
//! );
//!
//! println!("Simulator port: {}", config.simulator.port);
//! ```

pub mod controller;
pub mod modbus;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use controller::ControllerConfig;
pub use modbus::{DeviceIdentity, SimulatorConfig};
pub use utils::{is_valid_ip_address, output_config_schema, validate_specific_rules};

/// Root configuration structure.
///
/// Every section falls back to its defaults when missing from the file, so
/// an empty YAML document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Settings of the simulated tank and its Modbus server
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Settings of the controller (Modbus client)
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// A missing file is created with the default values. A file failing the
    /// schema, deserialization or the specific rules leaves a
    /// `<name>.sample.yaml` next to it and returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // An empty document parses as null and means "all defaults"
        let json_value = match serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })? {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            value => value,
        };

        let schema: serde_json::Value =
            serde_json::from_str(utils::CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_json::from_value(json_value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that were given replace the loaded values.
    ///
    /// # Parameters
    ///
    /// * `simulator_address` - Bind address of the simulator's Modbus server
    /// * `simulator_port` - TCP port of the simulator's Modbus server
    /// * `controller_host` - Host the controller connects to
    /// * `controller_port` - Port the controller connects to
    /// * `slave_id` - Modbus unit id used by the controller
    /// * `poll_interval_ms` - Controller poll interval in milliseconds
    /// * `log_file` - Controller log file, empty to disable
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        simulator_address: Option<String>,
        simulator_port: Option<u16>,
        controller_host: Option<String>,
        controller_port: Option<u16>,
        slave_id: Option<u8>,
        poll_interval_ms: Option<u64>,
        log_file: Option<String>,
    ) {
        if let Some(address) = simulator_address {
            debug!("Overriding simulator address from command line: {}", address);
            self.simulator.address = address;
        }
        if let Some(port) = simulator_port {
            debug!("Overriding simulator port from command line: {}", port);
            self.simulator.port = port;
        }

        if let Some(host) = controller_host {
            debug!("Overriding controller host from command line: {}", host);
            self.controller.host = host;
        }
        if let Some(port) = controller_port {
            debug!("Overriding controller port from command line: {}", port);
            self.controller.port = port;
        }
        if let Some(slave_id) = slave_id {
            debug!("Overriding slave id from command line: {}", slave_id);
            self.controller.slave_id = slave_id;
        }
        if let Some(interval) = poll_interval_ms {
            debug!("Overriding poll interval from command line: {} ms", interval);
            self.controller.poll_interval_ms = interval;
        }
        if let Some(log_file) = log_file {
            debug!("Overriding log file from command line: {:?}", log_file);
            self.controller.log_file = log_file;
        }
    }
}
