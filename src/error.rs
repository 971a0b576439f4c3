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

//! Error types and the response byte decoder

use thiserror::Error;
use crate::protocol::*;

// ============================================================================
// Device Errors
// ============================================================================

/// Failure reported by the device through a byte in the 0x80-0xFF range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    InvalidMagic,
    UpdatePrepare,
    AuthInvalid,
    WritingFlash,
    UpdateEnd,
    InvalidBootstrapping,
    WrongCurrentFlashConfig,
    WrongNewFlashConfig,
    Esp8266NotEnoughSpace,
    Esp32NotEnoughSpace,
    NoUpdatePartition,
    Md5Mismatch,
    Unknown,
}

impl DeviceError {
    pub fn from_code(code: u8) -> Option<Self> {
        let err = match code {
            RESPONSE_ERROR_MAGIC => DeviceError::InvalidMagic,
            RESPONSE_ERROR_UPDATE_PREPARE => DeviceError::UpdatePrepare,
            RESPONSE_ERROR_AUTH_INVALID => DeviceError::AuthInvalid,
            RESPONSE_ERROR_WRITING_FLASH => DeviceError::WritingFlash,
            RESPONSE_ERROR_UPDATE_END => DeviceError::UpdateEnd,
            RESPONSE_ERROR_INVALID_BOOTSTRAPPING => DeviceError::InvalidBootstrapping,
            RESPONSE_ERROR_WRONG_CURRENT_FLASH_CONFIG => DeviceError::WrongCurrentFlashConfig,
            RESPONSE_ERROR_WRONG_NEW_FLASH_CONFIG => DeviceError::WrongNewFlashConfig,
            RESPONSE_ERROR_ESP8266_NOT_ENOUGH_SPACE => DeviceError::Esp8266NotEnoughSpace,
            RESPONSE_ERROR_ESP32_NOT_ENOUGH_SPACE => DeviceError::Esp32NotEnoughSpace,
            RESPONSE_ERROR_NO_UPDATE_PARTITION => DeviceError::NoUpdatePartition,
            RESPONSE_ERROR_MD5_MISMATCH => DeviceError::Md5Mismatch,
            RESPONSE_ERROR_UNKNOWN => DeviceError::Unknown,
            _ => return None,
        };
        Some(err)
    }

    pub fn code(self) -> u8 {
        match self {
            DeviceError::InvalidMagic => RESPONSE_ERROR_MAGIC,
            DeviceError::UpdatePrepare => RESPONSE_ERROR_UPDATE_PREPARE,
            DeviceError::AuthInvalid => RESPONSE_ERROR_AUTH_INVALID,
            DeviceError::WritingFlash => RESPONSE_ERROR_WRITING_FLASH,
            DeviceError::UpdateEnd => RESPONSE_ERROR_UPDATE_END,
            DeviceError::InvalidBootstrapping => RESPONSE_ERROR_INVALID_BOOTSTRAPPING,
            DeviceError::WrongCurrentFlashConfig => RESPONSE_ERROR_WRONG_CURRENT_FLASH_CONFIG,
            DeviceError::WrongNewFlashConfig => RESPONSE_ERROR_WRONG_NEW_FLASH_CONFIG,
            DeviceError::Esp8266NotEnoughSpace => RESPONSE_ERROR_ESP8266_NOT_ENOUGH_SPACE,
            DeviceError::Esp32NotEnoughSpace => RESPONSE_ERROR_ESP32_NOT_ENOUGH_SPACE,
            DeviceError::NoUpdatePartition => RESPONSE_ERROR_NO_UPDATE_PARTITION,
            DeviceError::Md5Mismatch => RESPONSE_ERROR_MD5_MISMATCH,
            DeviceError::Unknown => RESPONSE_ERROR_UNKNOWN,
        }
    }

    /// Operator-facing diagnostic
    pub fn message(self) -> &'static str {
        match self {
            DeviceError::InvalidMagic => "Invalid magic byte",
            DeviceError::UpdatePrepare => {
                "Couldn't prepare flash memory for update. Is the binary too big? \
                 Please try restarting the device."
            }
            DeviceError::AuthInvalid => "Authentication invalid. Is the password correct?",
            DeviceError::WritingFlash => {
                "Writing OTA data to flash memory failed. See USB logs for more information."
            }
            DeviceError::UpdateEnd => {
                "Finishing update failed. See the MQTT/USB logs for more information."
            }
            DeviceError::InvalidBootstrapping => {
                "Please press the reset button on the device. A manual reset is required \
                 on the first OTA-Update after flashing via USB."
            }
            DeviceError::WrongCurrentFlashConfig => {
                "Device has been flashed with wrong flash size. Please choose the correct \
                 'board' option (esp01_1m always works) and then flash over USB."
            }
            DeviceError::WrongNewFlashConfig => {
                "Device does not have the requested flash size (wrong board). Please choose \
                 the correct 'board' option (esp01_1m always works) and try uploading again."
            }
            DeviceError::Esp8266NotEnoughSpace => {
                "Device does not have enough space to store OTA file. Please try flashing \
                 a minimal firmware (remove everything except ota)"
            }
            DeviceError::Esp32NotEnoughSpace => {
                "The OTA partition on the device is too small. It needs to be resized, \
                 please flash over USB."
            }
            DeviceError::NoUpdatePartition => {
                "The OTA partition on the device couldn't be found. It needs to be created, \
                 please flash over USB."
            }
            DeviceError::Md5Mismatch => {
                "Application MD5 code mismatch. Please try again or flash over USB with \
                 a good quality cable."
            }
            DeviceError::Unknown => "Unknown error from device",
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Why a response byte was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("{0}")]
    Device(DeviceError),
    #[error("Unexpected response from device: 0x{0:02X}")]
    Unexpected(u8),
}

/// Check a response byte against the codes allowed at this step.
///
/// An empty `expected` set disables validation entirely. Otherwise device
/// error codes always win, and any other byte outside `expected` is
/// reported as [`ResponseError::Unexpected`].
pub fn classify(byte: u8, expected: &[u8]) -> Result<(), ResponseError> {
    if expected.is_empty() {
        return Ok(());
    }
    if let Some(err) = DeviceError::from_code(byte) {
        return Err(ResponseError::Device(err));
    }
    if !expected.contains(&byte) {
        return Err(ResponseError::Unexpected(byte));
    }
    Ok(())
}

// ============================================================================
// Upload Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum OtaError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error {label}: {cause}")]
    Protocol {
        label: &'static str,
        cause: ResponseError,
    },

    #[error("Device uses unsupported OTA version {version}, supported versions are {:?}", SUPPORTED_VERSIONS)]
    UnsupportedVersion { version: u8 },

    #[error("Device requests password, but no password given!")]
    MissingPassword,

    #[error("Error {label}: device sent invalid text")]
    InvalidText { label: &'static str },

    #[error("Firmware of {size} bytes does not fit the 4-byte length field")]
    PayloadTooLarge { size: usize },
}

impl OtaError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OtaError::Io { context: context.into(), source }
    }

    /// Device error kind, if the device itself reported the failure
    pub fn device_error(&self) -> Option<DeviceError> {
        match self {
            OtaError::Protocol { cause: ResponseError::Device(err), .. } => Some(*err),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
