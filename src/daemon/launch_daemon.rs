// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Runs the two background services of the tank simulator process:
//!
//! - the Modbus TCP server exposing the register store
//! - the tank simulation loop updating the level once per second
//!
//! Both share a single [`RegisterStore`]. The Modbus server watches the
//! daemon's `running` flag; the simulation has no stop condition of its own
//! and is aborted on shutdown. A simulation that stops on a register store
//! error clears the flag, which takes the whole daemon down.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_tank_control::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     tokio::select! {
//!         _ = tokio::signal::ctrl_c() => {}
//!         _ = daemon.stopped() => {}
//!     }
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::modbus::{serve_tank, RegisterStore};
use crate::simulation::TankSimulator;

/// Task manager of the simulator process
///
/// # Fields
///
/// * `tasks` - Handles of the tasks stopped through the `running` flag
/// * `running` - Atomic flag shared with those tasks to coordinate shutdown
/// * `store` - Register bank shared by the Modbus server and the simulation
/// * `simulation` - Handle of the simulation loop, aborted on shutdown
/// * `modbus_addr` - Address the Modbus server is bound to, once launched
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    store: Arc<RegisterStore>,
    simulation: Option<JoinHandle<Result<()>>>,
    modbus_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance with a fresh register store
    pub fn new() -> Self {
        Self::with_store(Arc::new(RegisterStore::new()))
    }

    /// Create a daemon serving an existing register store
    pub fn with_store(store: Arc<RegisterStore>) -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            store,
            simulation: None,
            modbus_addr: None,
        }
    }

    /// Start the Modbus server and the tank simulation.
    ///
    /// # Errors
    ///
    /// Fails when the Modbus listener cannot bind to the configured address.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        self.start_modbus_server(config).await?;
        self.start_tank_simulation();
        Ok(())
    }

    /// Bind the listener and spawn the Modbus server task.
    ///
    /// Binding happens before spawning so address errors surface to the
    /// caller. The task then serves until the `running` flag is cleared.
    async fn start_modbus_server(&mut self, config: &Config) -> Result<()> {
        let bind_addr = config.simulator.socket_address();
        info!("Starting modbus server on {}", bind_addr);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind Modbus server to {}", bind_addr))?;
        let local_addr = listener.local_addr()?;
        self.modbus_addr = Some(local_addr);

        let running = self.running.clone();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            let server_handle = tokio::spawn(async move {
                if let Err(e) = serve_tank(listener, store).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) && !server_handle.is_finished() {
                time::sleep(Duration::from_millis(200)).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();

            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }

            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server listening on {}", local_addr);
        Ok(())
    }

    /// Spawn the one-second simulation loop
    fn start_tank_simulation(&mut self) {
        debug!("Starting tank simulation");
        let simulator = TankSimulator::new(self.store.clone());
        let running = self.running.clone();
        self.simulation = Some(tokio::spawn(async move {
            let result = simulator.run().await;
            // The loop only returns on a broken register layout
            error!("Tank simulation failed, stopping daemon");
            running.store(false, Ordering::SeqCst);
            result
        }));
        info!("Tank simulation started");
    }

    /// Whether no task has requested a stop yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until the `running` flag is cleared, by [`Daemon::shutdown`] or
    /// by a failed simulation
    pub async fn stopped(&self) {
        while self.running.load(Ordering::SeqCst) {
            time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Address of the running Modbus server
    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus_addr
    }

    /// Shared register store
    pub fn store(&self) -> Arc<RegisterStore> {
        self.store.clone()
    }

    /// Signal every task to stop.
    ///
    /// The Modbus server exits on the cleared `running` flag; the simulation
    /// loop is aborted. Call [`Daemon::join`] afterwards to wait for them.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        if let Some(simulation) = &self.simulation {
            simulation.abort();
        }
    }

    /// Wait for all tasks to complete
    ///
    /// Panics and errors of individual tasks are logged, not propagated.
    pub async fn join(self) -> Result<()> {
        let tasks = self.tasks.into_iter().chain(self.simulation);
        for task in tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {}", e),
                Ok(Err(e)) if e.is_cancelled() => debug!("Task cancelled"),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
