// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Controller side of the Modbus TCP link
//!
//! [`TankTransport`] is the seam between the control loop and the network.
//! [`ModbusTcpTransport`] implements it on top of a tokio-modbus client
//! context. The TCP socket is shared between that context and the transport
//! itself, so the diagnostic probe can write raw bytes and drain stray
//! responses on the very connection the Modbus client uses.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context as TaskContext, Poll};

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

/// Failures seen by the controller on the Modbus link
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Modbus protocol error: {0}")]
    Protocol(#[from] tokio_modbus::Error),
    #[error("Modbus exception response: {0}")]
    Exception(ExceptionCode),
    #[error("malformed {what} response: expected {expected} values, received {received}")]
    Malformed {
        what: &'static str,
        expected: usize,
        received: usize,
    },
}

/// Operations the control loop needs from the tank connection
#[async_trait]
pub trait TankTransport: Send {
    async fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>, TransportError>;

    async fn write_coil(&mut self, index: u16, value: bool) -> Result<(), TransportError>;

    /// Write `frame` verbatim on the connection, bypassing Modbus framing
    async fn send_raw(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Discard whatever bytes are already waiting on the connection without
    /// blocking. Returns the number of bytes dropped.
    fn drain_pending(&mut self) -> Result<usize, TransportError>;

    /// Close the connection. Errors are logged, not reported.
    async fn disconnect(&mut self);
}

fn flatten<T>(result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(code)) => Err(TransportError::Exception(code)),
        Err(err) => Err(err.into()),
    }
}

/// TCP stream handle shared between the Modbus client and raw access.
///
/// Reads and writes go through the readiness API of [`TcpStream`], which
/// only needs a shared reference.
#[derive(Debug, Clone)]
struct SharedStream(Arc<TcpStream>);

impl AsyncRead for SharedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            ready!(self.0.poll_read_ready(cx))?;
            match self.0.try_read(buf.initialize_unfilled()) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return Poll::Ready(Err(err)),
            }
        }
    }
}

impl AsyncWrite for SharedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.0.poll_write_ready(cx))?;
            match self.0.try_write(buf) {
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return Poll::Ready(Err(err)),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    // The socket closes once the last handle is dropped
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Modbus TCP connection to the tank simulator
pub struct ModbusTcpTransport {
    ctx: Context,
    stream: Arc<TcpStream>,
    peer: String,
}

impl ModbusTcpTransport {
    /// Connect to `host:port` and address requests to `slave_id`
    pub async fn connect(host: &str, port: u16, slave_id: u8) -> Result<Self, TransportError> {
        let peer = format!("{}:{}", host, port);
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: peer.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let stream = Arc::new(stream);
        let ctx = tcp::attach_slave(SharedStream(stream.clone()), Slave(slave_id));
        debug!("Modbus client attached to {} (unit {})", peer, slave_id);

        Ok(Self { ctx, stream, peer })
    }

    /// Address this transport is connected to
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

#[async_trait]
impl TankTransport for ModbusTcpTransport {
    async fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        flatten(self.ctx.read_holding_registers(start, count).await)
    }

    async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        flatten(self.ctx.read_coils(start, count).await)
    }

    async fn write_coil(&mut self, index: u16, value: bool) -> Result<(), TransportError> {
        flatten(self.ctx.write_single_coil(index, value).await)
    }

    async fn send_raw(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut writer = SharedStream(self.stream.clone());
        writer.write_all(frame).await?;
        Ok(())
    }

    fn drain_pending(&mut self) -> Result<usize, TransportError> {
        let mut buf = [0u8; 512];
        let mut drained = 0;
        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => drained += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        if drained > 0 {
            debug!("Drained {} pending bytes from {}", drained, self.peer);
        }
        Ok(drained)
    }

    async fn disconnect(&mut self) {
        if let Err(err) = self.ctx.disconnect().await {
            warn!("Error while closing connection to {}: {}", self.peer, err);
        }
    }
}
