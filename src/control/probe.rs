// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Diagnostic probe
//!
//! Sends a hand-built Modbus TCP "Read Holding Registers" frame on the live
//! connection. The reply is not awaited; any bytes already waiting are
//! discarded so the next regular request starts on a clean stream.

use super::transport::{TankTransport, TransportError};

/// Modbus TCP frame reading holding register 0 (count 1) from unit 1,
/// transaction id 0
pub const DIAGNOSTIC_FRAME: [u8; 12] = [
    0x00, 0x00, // transaction id
    0x00, 0x00, // protocol id
    0x00, 0x06, // remaining length
    0x01, // unit id
    0x03, // read holding registers
    0x00, 0x00, // start address
    0x00, 0x01, // quantity
];

/// Build a Modbus TCP read holding registers frame
pub fn read_holding_frame(transaction_id: u16, unit_id: u8, start: u16, count: u16) -> [u8; 12] {
    let [tid_hi, tid_lo] = transaction_id.to_be_bytes();
    let [start_hi, start_lo] = start.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    [
        tid_hi, tid_lo, 0x00, 0x00, 0x00, 0x06, unit_id, 0x03, start_hi, start_lo, count_hi,
        count_lo,
    ]
}

/// Send [`DIAGNOSTIC_FRAME`] and drain whatever is pending.
///
/// Returns the number of bytes drained. The reply to the probe itself
/// usually arrives later and is cleared by a subsequent drain.
pub async fn send_diagnostic_probe<T>(transport: &mut T) -> Result<usize, TransportError>
where
    T: TankTransport + ?Sized,
{
    transport.send_raw(&DIAGNOSTIC_FRAME).await?;
    transport.drain_pending()
}
