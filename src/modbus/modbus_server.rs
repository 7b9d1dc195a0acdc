// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the simulated water tank
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the simulated tank that
//! provides data, while the client is the controller that requests data.
//!
//! ## Register Map
//!
//! ### Coils (Read/Write)
//!
//! | Address | Description | Values |
//! |---------|-------------|--------|
//! | 0 | Pump | 0=OFF, 1=ON |
//! | 1 | Drain valve | 0=CLOSED, 1=OPEN |
//! | 2-19 | Reserved | - |
//!
//! ### Holding Registers (Read/Write)
//!
//! | Address | Description | Range |
//! |---------|-------------|-------|
//! | 0 | Tank level | 0-1000 |
//! | 1-19 | Reserved | - |
//!
//! Every other function code is answered with `IllegalFunction`.

use std::{future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::register_store::RegisterStore;

/// Per-connection Modbus service backed by the shared [`RegisterStore`].
///
/// Every connection gets its own instance; all of them point at the same
/// store, so a coil written by one client is immediately visible to the
/// simulation task and to other clients.
#[derive(Debug, Clone)]
pub struct TankModbusServer {
    store: Arc<RegisterStore>,
}

impl tokio_modbus::server::Service for TankModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// Supported function codes:
    /// - 0x01: Read Coils
    /// - 0x05: Write Single Coil
    /// - 0x0F: Write Multiple Coils
    /// - 0x03: Read Holding Registers
    /// - 0x06: Write Single Register
    /// - 0x10: Write Multiple Registers
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadCoils(addr, cnt) => self
                .store
                .read_coils(addr, cnt)
                .map(Response::ReadCoils)
                .map_err(illegal_address),
            Request::WriteSingleCoil(addr, value) => {
                debug!("Writing {} to coil {}", value, addr);
                self.store
                    .write_coil(addr, value)
                    .map(|_| Response::WriteSingleCoil(addr, value))
                    .map_err(illegal_address)
            }
            Request::WriteMultipleCoils(addr, values) => {
                debug!("Writing {} coils starting from address {}", values.len(), addr);
                self.store
                    .write_coils(addr, &values)
                    .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
                    .map_err(illegal_address)
            }
            Request::ReadHoldingRegisters(addr, cnt) => self
                .store
                .read_holding_registers(addr, cnt)
                .map(Response::ReadHoldingRegisters)
                .map_err(illegal_address),
            Request::WriteSingleRegister(addr, value) => {
                debug!("Writing value {} to holding register {}", value, addr);
                self.store
                    .write_holding_register(addr, value)
                    .map(|_| Response::WriteSingleRegister(addr, value))
                    .map_err(illegal_address)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                debug!(
                    "Writing {} values to holding registers starting from address {}",
                    values.len(),
                    addr
                );
                self.store
                    .write_holding_registers(addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
                    .map_err(illegal_address)
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        future::ready(res)
    }
}

impl TankModbusServer {
    /// Create a service instance over the shared register store
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self { store }
    }
}

fn illegal_address(err: super::register_store::RegisterStoreError) -> ExceptionCode {
    error!("Exception::IllegalDataAddress - {}", err);
    ExceptionCode::IllegalDataAddress
}

/// Serve Modbus TCP requests on `listener` until the task is aborted.
///
/// Each accepted connection is handled by a fresh [`TankModbusServer`]
/// sharing `store`.
pub async fn serve_tank(listener: TcpListener, store: Arc<RegisterStore>) -> Result<()> {
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        let store = store.clone();
        async move {
            info!("Modbus client connected from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(TankModbusServer::new(store.clone())))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus server error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}
