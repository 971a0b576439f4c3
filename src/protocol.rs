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

//! OTA protocol constants

use std::time::Duration;

/// Magic sequence opening every session
pub const MAGIC_BYTES: [u8; 5] = [0x6C, 0x26, 0xF7, 0x5C, 0x45];

// ============================================================================
// Success codes
// ============================================================================

/// Generic OK - version reply status and the final client acknowledgement
pub const RESPONSE_OK: u8 = 0x00;

/// Device requires challenge-response authentication
pub const RESPONSE_REQUEST_AUTH: u8 = 0x01;

/// Feature header accepted, no compression
pub const RESPONSE_HEADER_OK: u8 = 0x40;

/// Authentication passed (or not required)
pub const RESPONSE_AUTH_OK: u8 = 0x41;

/// Device prepared flash for an image of the announced size
pub const RESPONSE_UPDATE_PREPARE_OK: u8 = 0x42;

/// Device stored the image checksum
pub const RESPONSE_BIN_MD5_OK: u8 = 0x43;

/// Device received the whole image
pub const RESPONSE_RECEIVE_OK: u8 = 0x44;

/// Device verified and committed the image
pub const RESPONSE_UPDATE_END_OK: u8 = 0x45;

/// Feature header accepted, device will inflate a gzip stream
pub const RESPONSE_SUPPORTS_COMPRESSION: u8 = 0x46;

/// Per-chunk acknowledgement (version 2 and later)
pub const RESPONSE_CHUNK_OK: u8 = 0x47;

// ============================================================================
// Error codes
// ============================================================================

pub const RESPONSE_ERROR_MAGIC: u8 = 0x80;
pub const RESPONSE_ERROR_UPDATE_PREPARE: u8 = 0x81;
pub const RESPONSE_ERROR_AUTH_INVALID: u8 = 0x82;
pub const RESPONSE_ERROR_WRITING_FLASH: u8 = 0x83;
pub const RESPONSE_ERROR_UPDATE_END: u8 = 0x84;
pub const RESPONSE_ERROR_INVALID_BOOTSTRAPPING: u8 = 0x85;
pub const RESPONSE_ERROR_WRONG_CURRENT_FLASH_CONFIG: u8 = 0x86;
pub const RESPONSE_ERROR_WRONG_NEW_FLASH_CONFIG: u8 = 0x87;
pub const RESPONSE_ERROR_ESP8266_NOT_ENOUGH_SPACE: u8 = 0x88;
pub const RESPONSE_ERROR_ESP32_NOT_ENOUGH_SPACE: u8 = 0x89;
pub const RESPONSE_ERROR_NO_UPDATE_PARTITION: u8 = 0x8A;
pub const RESPONSE_ERROR_MD5_MISMATCH: u8 = 0x8B;
pub const RESPONSE_ERROR_UNKNOWN: u8 = 0xFF;

// ============================================================================
// Versions & features
// ============================================================================

pub const OTA_VERSION_1_0: u8 = 1;

/// First version acknowledging every chunk
pub const OTA_VERSION_2_0: u8 = 2;

pub const SUPPORTED_VERSIONS: [u8; 2] = [OTA_VERSION_1_0, OTA_VERSION_2_0];

/// Feature bit - client can send a gzip compressed image
pub const FEATURE_SUPPORTS_COMPRESSION: u8 = 0x01;

// ============================================================================
// Transfer tuning
// ============================================================================

/// Payload bytes written per chunk
pub const UPLOAD_BLOCK_SIZE: usize = 8192;

/// Send buffer clamp during transfer, keeps progress close to the wire
pub const UPLOAD_BUFFER_SIZE: usize = UPLOAD_BLOCK_SIZE * 8;

/// Length of the server nonce in an auth challenge
pub const AUTH_NONCE_LEN: usize = 32;

/// gzip level used when the device accepts compression
pub const COMPRESSION_LEVEL: u32 = 9;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after the final ack before the device is used again
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default OTA listening port
pub const DEFAULT_PORT: u16 = 3232;
