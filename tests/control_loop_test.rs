// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests of the controller against a live tank Modbus server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time;

use rust_tank_control::config::Config;
use rust_tank_control::control::{
    send_diagnostic_probe, ControlLoop, LoopExit, ModbusTcpTransport, OperatorCommand,
    TankTransport, TransportError,
};
use rust_tank_control::daemon::Daemon;
use rust_tank_control::modbus::{
    serve_tank, RegisterStore, INITIAL_LEVEL, LEVEL_REGISTER, PUMP_COIL, VALVE_COIL,
};

async fn start_test_server(
) -> Result<(SocketAddr, Arc<RegisterStore>, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;
    let store = Arc::new(RegisterStore::new());
    let server_store = store.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serve_tank(listener, server_store).await {
            eprintln!("Server error: {}", e);
        }
    });
    time::sleep(Duration::from_millis(50)).await;
    Ok((socket_addr, store, handle))
}

async fn connect(addr: SocketAddr) -> Result<ModbusTcpTransport, TransportError> {
    ModbusTcpTransport::connect(&addr.ip().to_string(), addr.port(), 1).await
}

#[tokio::test]
async fn test_transport_reads_and_writes() -> Result<(), Box<dyn std::error::Error>> {
    let (addr, store, _server) = start_test_server().await?;
    let mut transport = connect(addr).await?;

    assert_eq!(
        transport.read_holding_registers(LEVEL_REGISTER, 1).await?,
        vec![INITIAL_LEVEL]
    );
    transport.write_coil(VALVE_COIL, true).await?;
    assert_eq!(transport.read_coils(PUMP_COIL, 2).await?, vec![false, true]);
    assert_eq!(store.read_coils(VALVE_COIL, 1)?, vec![true]);

    let err = transport.read_coils(30, 1).await.unwrap_err();
    assert!(matches!(err, TransportError::Exception(_)));

    transport.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_poll_drives_pump_from_level() -> Result<(), Box<dyn std::error::Error>> {
    let (addr, store, _server) = start_test_server().await?;
    let mut control_loop = ControlLoop::new(connect(addr).await?, Duration::from_millis(20));

    store.write_holding_register(LEVEL_REGISTER, 250)?;
    control_loop.poll_once().await?;
    assert_eq!(store.read_coils(PUMP_COIL, 1)?, vec![true]);

    store.write_holding_register(LEVEL_REGISTER, 450)?;
    control_loop.poll_once().await?;
    assert_eq!(store.read_coils(PUMP_COIL, 1)?, vec![true], "band holds the pump");

    store.write_holding_register(LEVEL_REGISTER, 750)?;
    control_loop.poll_once().await?;
    assert_eq!(store.read_coils(PUMP_COIL, 1)?, vec![false]);

    control_loop.into_transport().disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_probe_leaves_connection_in_sync() -> Result<(), Box<dyn std::error::Error>> {
    let (addr, store, _server) = start_test_server().await?;
    let mut transport = connect(addr).await?;

    let mut drained = send_diagnostic_probe(&mut transport).await?;
    let deadline = time::Instant::now() + Duration::from_secs(2);
    while drained < 11 && time::Instant::now() < deadline {
        time::sleep(Duration::from_millis(20)).await;
        drained += transport.drain_pending()?;
    }
    assert_eq!(drained, 11, "the whole probe response is discarded");

    store.write_holding_register(LEVEL_REGISTER, 321)?;
    assert_eq!(
        transport.read_holding_registers(LEVEL_REGISTER, 1).await?,
        vec![321]
    );
    assert_eq!(store.read_coils(PUMP_COIL, 2)?, vec![false, false]);

    transport.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_run_applies_operator_commands() -> Result<(), Box<dyn std::error::Error>> {
    let (addr, store, _server) = start_test_server().await?;
    let control_loop = ControlLoop::new(connect(addr).await?, Duration::from_millis(20));
    let (tx, rx) = mpsc::channel(4);

    let runner = tokio::spawn(async move {
        let mut control_loop = control_loop;
        let exit = control_loop.run(rx).await;
        control_loop.into_transport().disconnect().await;
        exit
    });

    tx.send(OperatorCommand::ForceDrain).await?;
    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.read_coils(PUMP_COIL, 2)?, vec![false, true]);

    tx.send(OperatorCommand::ForceFill).await?;
    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.read_coils(PUMP_COIL, 2)?, vec![true, false]);

    tx.send(OperatorCommand::Quit).await?;
    let exit = time::timeout(Duration::from_secs(2), runner).await??;
    assert_eq!(exit, LoopExit::Quit);
    Ok(())
}

#[tokio::test]
async fn test_repeated_probes_keep_loop_running() -> Result<(), Box<dyn std::error::Error>> {
    let (addr, store, _server) = start_test_server().await?;
    let control_loop = ControlLoop::new(connect(addr).await?, Duration::from_millis(20));
    let (tx, rx) = mpsc::channel(4);

    let runner = tokio::spawn(async move {
        let mut control_loop = control_loop;
        let exit = control_loop.run(rx).await;
        (exit, control_loop)
    });

    for _ in 0..6 {
        tx.send(OperatorCommand::Probe).await?;
        time::sleep(Duration::from_millis(65)).await;
    }
    // Regular polls still see the tank after the probes
    store.write_holding_register(LEVEL_REGISTER, 250)?;
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.read_coils(PUMP_COIL, 1)?, vec![true]);

    tx.send(OperatorCommand::Quit).await?;
    let (exit, control_loop) = time::timeout(Duration::from_secs(2), runner).await??;
    assert_eq!(exit, LoopExit::Quit);
    control_loop.into_transport().disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_run_stops_when_peer_closes() -> Result<(), Box<dyn std::error::Error>> {
    // A peer that accepts the connection and hangs up right away
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let peer = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let mut control_loop = ControlLoop::new(connect(addr).await?, Duration::from_millis(20));
    peer.await?;
    let (_tx, rx) = mpsc::channel(4);

    let exit = time::timeout(Duration::from_secs(5), control_loop.run(rx)).await?;
    assert_eq!(exit, LoopExit::ReadFailure);
    Ok(())
}

#[tokio::test]
async fn test_connect_failure() -> Result<(), Box<dyn std::error::Error>> {
    // Grab a free port and release it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let result = connect(addr).await;
    assert!(matches!(result, Err(TransportError::Connect { .. })));
    Ok(())
}

#[tokio::test]
async fn test_daemon_serves_simulated_tank() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.simulator.port = 0;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let addr = daemon.modbus_addr().ok_or("daemon did not bind")?;

    let mut transport = connect(addr).await?;
    transport.write_coil(PUMP_COIL, true).await?;
    time::sleep(Duration::from_millis(2300)).await;

    let level = transport.read_holding_registers(LEVEL_REGISTER, 1).await?[0];
    assert!(level > INITIAL_LEVEL, "pump raises the level, got {}", level);
    assert!(level <= INITIAL_LEVEL + 15);

    transport.disconnect().await;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
