// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the TankModbusServer implementation
//!
//! These tests start the tank Modbus server on an ephemeral port and talk to
//! it with a regular tokio-modbus client, or with raw bytes for the
//! diagnostic frame.

use std::str::FromStr;
use std::time::Duration;
use std::{net::SocketAddr, sync::Arc};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_modbus::prelude::*;

use rust_tank_control::control::DIAGNOSTIC_FRAME;
use rust_tank_control::modbus::{
    serve_tank, RegisterStore, INITIAL_LEVEL, LEVEL_REGISTER, PUMP_COIL, VALVE_COIL,
};

/// Test utility function to start a tank Modbus server in the background
async fn start_test_server(
) -> Result<(SocketAddr, Arc<RegisterStore>, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>>
{
    // Use port 0 to let the OS assign an available port
    let socket_addr = SocketAddr::from_str("127.0.0.1:0")?;
    let listener = TcpListener::bind(socket_addr).await?;
    let socket_addr = listener.local_addr()?;

    let store = Arc::new(RegisterStore::new());
    let server_store = store.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serve_tank(listener, server_store).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(50)).await;

    Ok((socket_addr, store, handle))
}

#[tokio::test]
async fn test_initial_tank_registers() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _store, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    let level = ctx.read_holding_registers(LEVEL_REGISTER, 1).await??;
    assert_eq!(level, vec![INITIAL_LEVEL]);

    let coils = ctx.read_coils(PUMP_COIL, 2).await??;
    assert_eq!(coils.len(), 2);
    assert!(!coils[0], "pump starts off");
    assert!(!coils[1], "valve starts closed");

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_coil_writes_reach_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, store, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    ctx.write_single_coil(PUMP_COIL, true).await??;
    ctx.write_single_coil(VALVE_COIL, true).await??;
    assert_eq!(store.read_coils(PUMP_COIL, 2)?, vec![true, true]);

    ctx.write_multiple_coils(PUMP_COIL, &[false, true]).await??;
    let coils = ctx.read_coils(PUMP_COIL, 2).await??;
    assert_eq!(coils, vec![false, true]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_register_writes() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, store, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    ctx.write_single_register(LEVEL_REGISTER, 123).await??;
    assert_eq!(store.read_holding_registers(LEVEL_REGISTER, 1)?, vec![123]);

    ctx.write_multiple_registers(18, &[7, 8]).await??;
    let data = ctx.read_holding_registers(18, 2).await??;
    assert_eq!(data, vec![7, 8]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_is_illegal_address() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _store, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    let result = ctx.read_coils(19, 2).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.read_holding_registers(20, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.write_single_coil(20, true).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    // The connection stays usable after an exception
    let level = ctx.read_holding_registers(LEVEL_REGISTER, 1).await??;
    assert_eq!(level, vec![INITIAL_LEVEL]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_functions_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _store, _server_handle) = start_test_server().await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    let result = ctx.read_input_registers(0, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    let result = ctx.read_discrete_inputs(0, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_raw_diagnostic_frame() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, store, _server_handle) = start_test_server().await?;
    let mut stream = TcpStream::connect(socket_addr).await?;

    stream.write_all(&DIAGNOSTIC_FRAME).await?;

    let mut response = [0u8; 11];
    time::timeout(Duration::from_secs(2), stream.read_exact(&mut response)).await??;
    assert_eq!(
        response,
        [0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x01, 0xF4]
    );

    // The probe is a read: nothing in the store changed
    assert_eq!(store.read_holding_registers(LEVEL_REGISTER, 1)?, vec![INITIAL_LEVEL]);
    assert_eq!(store.read_coils(PUMP_COIL, 2)?, vec![false, false]);
    Ok(())
}

#[tokio::test]
async fn test_multiple_clients_share_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _store, _server_handle) = start_test_server().await?;

    let mut client1 = tcp::connect_slave(socket_addr, Slave(1)).await?;
    let mut client2 = tcp::connect_slave(socket_addr, Slave(1)).await?;

    client1.write_single_coil(VALVE_COIL, true).await??;
    let coils = client2.read_coils(PUMP_COIL, 2).await??;
    assert_eq!(coils, vec![false, true]);

    client1.disconnect().await?;
    client2.disconnect().await?;
    Ok(())
}
