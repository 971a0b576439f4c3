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

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use socket2::SockRef;

// ============================================================================
// Connection Trait
// ============================================================================

/// Trait for the byte stream operations needed by the OTA protocol
pub trait Connection: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Toggle immediate sending of small writes
    fn set_nodelay(&mut self, nodelay: bool) -> std::io::Result<()>;

    /// Applies to both reads and writes
    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;

    fn set_send_buffer_size(&mut self, size: usize) -> std::io::Result<()>;

    fn close(&mut self) -> std::io::Result<()>;
}

// ============================================================================
// TCP Implementation
// ============================================================================

/// Connection backed by a connected TCP socket
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    pub fn connect(addr: &SocketAddr, timeout: Duration) -> std::io::Result<Self> {
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        let mut conn = TcpConnection { stream };
        conn.set_timeout(timeout)?;
        Ok(conn)
    }
}

impl Connection for TcpConnection {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }

    fn set_nodelay(&mut self, nodelay: bool) -> std::io::Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))
    }

    fn set_send_buffer_size(&mut self, size: usize) -> std::io::Result<()> {
        SockRef::from(&self.stream).set_send_buffer_size(size)
    }

    fn close(&mut self) -> std::io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Mock Connection for Testing
// ============================================================================

/// Everything the code under test did to a [`MockConnection`], in order
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(Vec<u8>),
    Read(Vec<u8>),
    NoDelay(bool),
    Timeout(Duration),
    SendBuffer(usize),
    Close,
}

#[cfg(test)]
pub type EventLog = std::sync::Arc<std::sync::Mutex<Vec<Event>>>;

#[cfg(test)]
pub struct MockConnection {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    events: EventLog,
}

#[cfg(test)]
impl MockConnection {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockConnection {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
            events: EventLog::default(),
        }
    }

    /// Shared handle to the event log, usable after the mock is boxed away
    pub fn events(&self) -> EventLog {
        std::sync::Arc::clone(&self.events)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl Connection for MockConnection {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        self.record(Event::Write(buf.to_vec()));
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Out of responses = timeout
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout"
            ));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout"
            ));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,  // Stop at timeout marker
            }
        }

        self.record(Event::Read(buf[..bytes_read].to_vec()));
        Ok(bytes_read)
    }

    fn set_nodelay(&mut self, nodelay: bool) -> std::io::Result<()> {
        self.record(Event::NoDelay(nodelay));
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.record(Event::Timeout(timeout));
        Ok(())
    }

    fn set_send_buffer_size(&mut self, size: usize) -> std::io::Result<()> {
        self.record(Event::SendBuffer(size));
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.record(Event::Close);
        Ok(())
    }
}

#[cfg(test)]
impl Drop for MockConnection {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockConnection dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockConnection write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}
