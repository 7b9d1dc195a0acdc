// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the tank simulator (Modbus server side)

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio::signal;

use rust_tank_control::config::{self, Config};
use rust_tank_control::daemon::Daemon;
use rust_tank_control::utility::{init_logger, level_from_flags};

/// Simulated water tank exposed over Modbus TCP
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus server address
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// Modbus server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(level_from_flags(args.verbose, args.quiet), None)?;

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(args.address, args.port, None, None, None, None, None);
    config::validate_specific_rules(&config)?;

    let identity = &config.simulator.identity;
    info!(
        "Device identity: vendor={} product_code={} product_name={} unit={}",
        identity.vendor_name,
        identity.product_code,
        identity.product_name,
        config.simulator.unit_id
    );

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    let failed = tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal, terminating daemon"),
                Err(err) => eprintln!("Error waiting for shutdown signal: {}", err),
            }
            false
        }
        _ = daemon.stopped() => true,
    };
    daemon.shutdown();
    daemon.join().await?;

    if failed {
        return Err(anyhow::anyhow!("Tank simulation stopped on a register store error"));
    }
    Ok(())
}
