// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Checked send/receive on top of a [`Connection`]

use std::time::Duration;
use tracing::debug;
use crate::connection::Connection;
use crate::error::{classify, OtaError};

// ============================================================================
// Wire Data
// ============================================================================

/// Values that can be sent as-is over the link
pub trait ToWire {
    fn to_wire(&self) -> &[u8];
}

impl ToWire for u8 {
    fn to_wire(&self) -> &[u8] {
        std::slice::from_ref(self)
    }
}

impl ToWire for [u8] {
    fn to_wire(&self) -> &[u8] {
        self
    }
}

impl<const N: usize> ToWire for [u8; N] {
    fn to_wire(&self) -> &[u8] {
        self
    }
}

impl ToWire for str {
    fn to_wire(&self) -> &[u8] {
        self.as_bytes()
    }
}

// ============================================================================
// Link
// ============================================================================

/// Sole owner of the device connection for one upload attempt.
///
/// The connection is closed exactly once: either explicitly when a
/// response is rejected, or when the link is dropped.
pub struct Link {
    conn: Box<dyn Connection>,
    closed: bool,
}

impl Link {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        Link { conn, closed: false }
    }

    pub fn send<T: ToWire + ?Sized>(&mut self, data: &T, label: &str) -> Result<(), OtaError> {
        self.ensure_open()
            .and_then(|_| self.conn.write_all(data.to_wire()))
            .map_err(|e| OtaError::io(format!("Error sending {}", label), e))
    }

    /// Read `amount` bytes, validating the first one against `expected`.
    ///
    /// A rejected first byte closes the connection before the error is
    /// returned. An empty `expected` reads without validation.
    pub fn receive_exactly(
        &mut self,
        amount: usize,
        label: &'static str,
        expected: &[u8],
    ) -> Result<Vec<u8>, OtaError> {
        let mut data = vec![0u8; amount];
        if amount == 0 {
            return Ok(data);
        }

        self.fill(&mut data[..1])
            .map_err(|e| OtaError::io(format!("Error receiving acknowledge {}", label), e))?;

        if let Err(cause) = classify(data[0], expected) {
            self.close();
            return Err(OtaError::Protocol { label, cause });
        }

        self.fill(&mut data[1..])
            .map_err(|e| OtaError::io(format!("Error receiving {}", label), e))?;
        Ok(data)
    }

    /// Single status byte that must be one of `expected`
    pub fn receive_status(&mut self, label: &'static str, expected: &[u8]) -> Result<u8, OtaError> {
        let data = self.receive_exactly(1, label, expected)?;
        Ok(data[0])
    }

    /// Unvalidated bytes decoded as UTF-8 text
    pub fn receive_text(&mut self, amount: usize, label: &'static str) -> Result<String, OtaError> {
        let data = self.receive_exactly(amount, label, &[])?;
        String::from_utf8(data).map_err(|_| OtaError::InvalidText { label })
    }

    pub fn set_nodelay(&mut self, nodelay: bool) -> Result<(), OtaError> {
        self.conn
            .set_nodelay(nodelay)
            .map_err(|e| OtaError::io("Error setting TCP_NODELAY", e))
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), OtaError> {
        self.conn
            .set_timeout(timeout)
            .map_err(|e| OtaError::io("Error setting connection timeout", e))
    }

    pub fn set_send_buffer_size(&mut self, size: usize) -> Result<(), OtaError> {
        self.conn
            .set_send_buffer_size(size)
            .map_err(|e| OtaError::io("Error setting send buffer size", e))
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.conn.close() {
            debug!("Error closing connection: {}", e);
        }
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "connection already closed",
            ));
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.ensure_open()?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.conn.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed by device",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
