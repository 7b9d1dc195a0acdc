// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tank controller configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings of the controller binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Host name or address of the tank simulator
    pub host: String,

    pub port: u16,

    /// Modbus unit identifier used in every request
    pub slave_id: u8,

    /// Delay between two sensor polls, in milliseconds
    pub poll_interval_ms: u64,

    /// File receiving a copy of the log output. An empty string disables it.
    pub log_file: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5020,
            slave_id: 1,
            poll_interval_ms: 2000,
            log_file: "client.log".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Log file path, `None` when file logging is disabled
    pub fn log_path(&self) -> Option<PathBuf> {
        if self.log_file.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.log_file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.log_path(), Some(PathBuf::from("client.log")));
    }

    #[test]
    fn test_empty_log_file_disables_logging_to_file() {
        let config = ControllerConfig {
            log_file: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.log_path(), None);
    }
}
