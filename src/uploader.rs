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

use std::io::Write;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};
use crate::auth::{auth_response, md5_hex, random_cnonce, NonceSource};
use crate::connection::Connection;
use crate::error::OtaError;
use crate::progress::ProgressBar;
use crate::protocol::*;
use crate::transport::Link;

// ============================================================================
// Options
// ============================================================================

pub struct UploadOptions {
    /// Read/write timeout from the prepare step onward
    pub upload_timeout: Duration,
    /// Pause after the final acknowledgement
    pub settle_delay: Duration,
    /// Advertise gzip support during feature negotiation
    pub offer_compression: bool,
    pub progress: Box<dyn Write + Send>,
    pub cnonce: NonceSource,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            upload_timeout: UPLOAD_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            offer_compression: true,
            progress: Box::new(std::io::stderr()),
            cnonce: Box::new(random_cnonce),
        }
    }
}

// ============================================================================
// States
// ============================================================================

pub struct Init;
pub struct VersionCheck;
pub struct FeatureNegotiation;
pub struct Auth;
pub struct PrepareUpdate;
pub struct ChecksumExchange;
pub struct Transfer;
pub struct Finalize;

// ============================================================================
// FSM Structure
// ============================================================================

/// Per-attempt session state, carried from state to state
struct Session {
    link: Link,
    password: Option<String>,
    /// Firmware as it goes on the wire (gzip compressed once negotiated)
    payload: Vec<u8>,
    version: u8,
    compressed: bool,
    checksum: String,
    offset: usize,
    started: Option<Instant>,
    progress: ProgressBar<Box<dyn Write + Send>>,
    upload_timeout: Duration,
    settle_delay: Duration,
    offer_compression: bool,
    cnonce: NonceSource,
}

pub struct UploadFsm<State> {
    state: PhantomData<State>,
    session: Session,
}

pub enum Transition {
    Next(Box<dyn UploadState>),
    Complete,
}

// ============================================================================
// Trait
// ============================================================================

pub trait UploadState: Send {
    fn step(self: Box<Self>) -> Result<Transition, OtaError>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> UploadFsm<S> {
    fn transition<T>(self) -> Transition
    where
        UploadFsm<T>: UploadState + 'static,
    {
        let next = Box::new(UploadFsm::<T> {
            state: PhantomData,
            session: self.session,
        });
        debug!("Entering state {}", next.name());
        Transition::Next(next as Box<dyn UploadState>)
    }
}

fn state_name<S>() -> &'static str {
    let type_name = std::any::type_name::<S>();
    type_name.split("::").last().unwrap_or(type_name)
}

// ============================================================================
// State Implementations
// ============================================================================

impl UploadState for UploadFsm<Init> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        // Handshake messages are tiny, send them immediately
        fsm.session.link.set_nodelay(true)?;
        fsm.session.link.send(&MAGIC_BYTES, "magic bytes")?;
        Ok(fsm.transition::<VersionCheck>())
    }

    fn name(&self) -> &'static str {
        state_name::<Init>()
    }
}

impl UploadState for UploadFsm<VersionCheck> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        let reply = fsm.session.link.receive_exactly(2, "version", &[RESPONSE_OK])?;
        let version = reply[1];
        debug!("Device supports OTA version: {}", version);

        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(OtaError::UnsupportedVersion { version });
        }
        fsm.session.version = version;
        Ok(fsm.transition::<FeatureNegotiation>())
    }

    fn name(&self) -> &'static str {
        state_name::<VersionCheck>()
    }
}

impl UploadState for UploadFsm<FeatureNegotiation> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        let features = if fsm.session.offer_compression { FEATURE_SUPPORTS_COMPRESSION } else { 0x00 };
        fsm.session.link.send(&features, "features")?;

        let reply = fsm.session.link.receive_status(
            "features",
            &[RESPONSE_HEADER_OK, RESPONSE_SUPPORTS_COMPRESSION],
        )?;

        if reply == RESPONSE_SUPPORTS_COMPRESSION {
            fsm.session.payload = compress_payload(&fsm.session.payload)
                .map_err(|e| OtaError::io("Error compressing firmware", e))?;
            fsm.session.compressed = true;
            info!("Compressed to {} bytes", fsm.session.payload.len());
        }
        Ok(fsm.transition::<Auth>())
    }

    fn name(&self) -> &'static str {
        state_name::<FeatureNegotiation>()
    }
}

impl UploadState for UploadFsm<Auth> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        let reply = fsm.session.link.receive_status("auth", &[RESPONSE_REQUEST_AUTH, RESPONSE_AUTH_OK])?;
        if reply == RESPONSE_AUTH_OK {
            return Ok(fsm.transition::<PrepareUpdate>());
        }

        let password = match fsm.session.password.take() {
            Some(password) => password,
            None => return Err(OtaError::MissingPassword),
        };

        let nonce = fsm.session.link.receive_text(AUTH_NONCE_LEN, "authentication nonce")?;
        debug!("Auth: Nonce is {}", nonce);
        let cnonce = (fsm.session.cnonce)();
        debug!("Auth: CNonce is {}", cnonce);
        fsm.session.link.send(cnonce.as_str(), "auth cnonce")?;

        let result = auth_response(&password, &nonce, &cnonce);
        debug!("Auth: Result is {}", result);
        fsm.session.link.send(result.as_str(), "auth result")?;
        fsm.session.link.receive_status("auth result", &[RESPONSE_AUTH_OK])?;

        Ok(fsm.transition::<PrepareUpdate>())
    }

    fn name(&self) -> &'static str {
        state_name::<Auth>()
    }
}

impl UploadState for UploadFsm<PrepareUpdate> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        fsm.session.link.set_timeout(fsm.session.upload_timeout)?;

        let size = fsm.session.payload.len();
        let encoded = u32::try_from(size)
            .map_err(|_| OtaError::PayloadTooLarge { size })?
            .to_be_bytes();
        fsm.session.link.send(&encoded, "binary size")?;
        fsm.session.link.receive_status("binary size", &[RESPONSE_UPDATE_PREPARE_OK])?;

        Ok(fsm.transition::<ChecksumExchange>())
    }

    fn name(&self) -> &'static str {
        state_name::<PrepareUpdate>()
    }
}

impl UploadState for UploadFsm<ChecksumExchange> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        fsm.session.checksum = md5_hex(&fsm.session.payload);
        debug!("MD5 of upload is {}", fsm.session.checksum);

        fsm.session.link.send(fsm.session.checksum.as_str(), "file checksum")?;
        fsm.session.link.receive_status("file checksum", &[RESPONSE_BIN_MD5_OK])?;

        Ok(fsm.transition::<Transfer>())
    }

    fn name(&self) -> &'static str {
        state_name::<ChecksumExchange>()
    }
}

impl UploadState for UploadFsm<Transfer> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        let session = &mut fsm.session;

        if session.started.is_none() {
            // Coalesce writes again; clamp the send buffer so progress tracks the wire
            session.link.set_nodelay(false)?;
            session.link.set_send_buffer_size(UPLOAD_BUFFER_SIZE)?;
            session.started = Some(Instant::now());
            debug!(
                "Sending {} bytes (compressed: {}, chunk acks: {})",
                session.payload.len(),
                session.compressed,
                session.version >= OTA_VERSION_2_0
            );
        }

        let total = session.payload.len();
        if session.offset >= total {
            session.progress.done();
            return Ok(fsm.transition::<Finalize>());
        }

        let end = (session.offset + UPLOAD_BLOCK_SIZE).min(total);
        if let Err(e) = send_chunk(session, end) {
            session.progress.done();
            return Err(e);
        }
        session.offset = end;
        session.progress.update(session.offset as f64 / total as f64);

        Ok(Transition::Next(Box::new(fsm)))
    }

    fn name(&self) -> &'static str {
        state_name::<Transfer>()
    }
}

impl UploadState for UploadFsm<Finalize> {
    fn step(self: Box<Self>) -> Result<Transition, OtaError> {
        let mut fsm = *self;
        fsm.session.link.set_nodelay(true)?;

        let elapsed = fsm.session.started.map(|t| t.elapsed()).unwrap_or_default();
        info!("Upload took {:.2} seconds, waiting for result...", elapsed.as_secs_f64());

        fsm.session.link.receive_status("receive OK", &[RESPONSE_RECEIVE_OK])?;
        fsm.session.link.receive_status("Update end", &[RESPONSE_UPDATE_END_OK])?;
        fsm.session.link.send(&RESPONSE_OK, "end acknowledgement")?;

        info!("OTA successful");

        // Let the device reboot before anyone reconnects
        std::thread::sleep(fsm.session.settle_delay);
        Ok(Transition::Complete)
    }

    fn name(&self) -> &'static str {
        state_name::<Finalize>()
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl UploadFsm<Init> {
    pub fn new(
        conn: Box<dyn Connection>,
        password: Option<&str>,
        payload: Vec<u8>,
        options: UploadOptions,
    ) -> Box<dyn UploadState> {
        Box::new(UploadFsm {
            state: PhantomData::<Init>,
            session: Session {
                link: Link::new(conn),
                password: password.filter(|p| !p.is_empty()).map(str::to_owned),
                payload,
                version: 0,
                compressed: false,
                checksum: String::new(),
                offset: 0,
                started: None,
                progress: ProgressBar::new(options.progress),
                upload_timeout: options.upload_timeout,
                settle_delay: options.settle_delay,
                offer_compression: options.offer_compression,
                cnonce: options.cnonce,
            },
        })
    }
}

/// Run one complete upload attempt over `conn`.
///
/// The connection is closed before this returns, on success and on every
/// failure path.
pub fn perform_upload(
    conn: Box<dyn Connection>,
    password: Option<&str>,
    payload: Vec<u8>,
    filename: &str,
    options: UploadOptions,
) -> Result<(), OtaError> {
    info!("Uploading {} ({} bytes)", filename, payload.len());

    let mut state = UploadFsm::new(conn, password, payload, options);
    loop {
        match state.step()? {
            Transition::Next(next) => state = next,
            Transition::Complete => return Ok(()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn send_chunk(session: &mut Session, end: usize) -> Result<(), OtaError> {
    session.link.send(&session.payload[session.offset..end], "data")?;
    if session.version >= OTA_VERSION_2_0 {
        session.link.receive_status("chunk OK", &[RESPONSE_CHUNK_OK])?;
    }
    Ok(())
}

pub fn compress_payload(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    encoder.write_all(data)?;
    encoder.finish()
}

// ============================================================================
// Tests
// ============================================================================
