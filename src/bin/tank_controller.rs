// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Tank controller: polls the simulator and drives the pump and the valve

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use tokio::signal;
use tokio::sync::mpsc;

use rust_tank_control::config::{self, Config};
use rust_tank_control::control::keyboard::{spawn_keyboard_reader, RawModeGuard};
use rust_tank_control::control::{
    ControlLoop, LoopExit, ModbusTcpTransport, OperatorCommand, TankTransport,
};
use rust_tank_control::utility::{attach_log_file, init_logger, level_from_flags};

/// Interactive controller of the simulated water tank
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Tank simulator host
    #[arg(long)]
    host: Option<String>,

    /// Tank simulator port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Modbus unit id of the tank
    #[arg(long)]
    slave_id: Option<u8>,

    /// Delay between two polls in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Log file, empty string to disable
    #[arg(long)]
    log_file: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

const CONTROLS: &str = "Controls:
  p  toggle pump override (disables auto)
  v  toggle valve override
  a  toggle automatic control
  f  force fill (pump ON, valve CLOSED)
  d  force drain (pump OFF, valve OPEN)
  t  send diagnostic probe
  q  quit";

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
    config.apply_args(
        None,
        None,
        args.host,
        args.port,
        args.slave_id,
        args.poll_interval_ms,
        args.log_file,
    );
    config::validate_specific_rules(&config)?;
    let settings = config.controller;

    if let Some(path) = settings.log_path() {
        attach_log_file(&path)?;
    }

    let transport =
        match ModbusTcpTransport::connect(&settings.host, settings.port, settings.slave_id).await {
            Ok(transport) => transport,
            Err(err) => {
                error!("Cannot connect to {}:{}", settings.host, settings.port);
                return Err(err.into());
            }
        };
    info!("Connected to Tank Simulator at {}", transport.peer());
    println!("{}", CONTROLS);

    let (commands_tx, commands_rx) = mpsc::channel(4);
    let running = Arc::new(AtomicBool::new(true));

    let raw_mode = if std::io::stdin().is_terminal() {
        match RawModeGuard::enable() {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!("Keyboard control unavailable: {:#}", err);
                None
            }
        }
    } else {
        warn!("Standard input is not a terminal, keyboard control disabled");
        None
    };
    let keyboard = raw_mode
        .as_ref()
        .map(|_| spawn_keyboard_reader(commands_tx.clone(), running.clone()));

    let interrupt_tx = commands_tx;
    let interrupt = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(OperatorCommand::Interrupt).await;
        }
    });

    let mut control_loop = ControlLoop::new(transport, settings.poll_interval());
    let exit = control_loop.run(commands_rx).await;

    running.store(false, Ordering::SeqCst);
    interrupt.abort();
    control_loop.into_transport().disconnect().await;
    drop(raw_mode);
    if let Some(keyboard) = keyboard {
        if keyboard.join().is_err() {
            warn!("Keyboard reader panicked");
        }
    }

    if exit == LoopExit::ReadFailure {
        info!("Control loop stopped after a failed read");
    }
    println!();
    info!("Master shutdown");
    Ok(())
}
