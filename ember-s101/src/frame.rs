//! Frame boundary encoding
//!
//! Two self-delimiting variants exist on the wire:
//!
//! - **Escaping**: `BOF body CRC EOF`, where every body or CRC byte in the
//!   control range (>= 0xF8) is replaced by the escape byte followed by the
//!   value XOR 0x20. The framing is unambiguous over a raw byte stream
//!   because control bytes never appear unescaped inside a frame.
//! - **Non-escaping**: a zero marker byte, a big-endian u32 length, then the
//!   raw message bytes with no checksum.
//!
//! [`Framer`] produces frames in either variant; [`Deframer`] recognizes
//! both on receive, switching per frame on the leading byte.

use crate::crc::Crc16;
use crate::package::{Command, ProviderState, FRAMING_VERSION, MESSAGE_ID};
use bytes::Bytes;

/// Frame start byte of the escaping variant.
pub const BOF: u8 = 0xFE;

/// Frame end byte of the escaping variant.
pub const EOF: u8 = 0xFF;

/// Escape marker; the following byte is XOR-ed with 0x20.
pub const CE: u8 = 0xFD;

/// XOR applied to escaped bytes.
pub const ESCAPE_XOR: u8 = 0x20;

/// Marker byte opening a non-escaping frame.
pub const INVALID: u8 = 0x00;

/// Smallest byte value that must be escaped inside a frame.
pub const ESCAPE_THRESHOLD: u8 = 0xF8;

/// Frame variant selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFormat {
    /// Byte-stuffed frames with CRC protection
    Escaping,
    /// Length-prefixed frames without escaping
    NonEscaping,
}

/// Wraps messages into self-delimiting wire frames
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    format: FramingFormat,
}

impl Framer {
    /// Create a framer producing escaped, CRC-protected frames.
    pub fn escaping() -> Self {
        Self {
            format: FramingFormat::Escaping,
        }
    }

    /// Create a framer producing length-prefixed frames.
    pub fn non_escaping() -> Self {
        Self {
            format: FramingFormat::NonEscaping,
        }
    }

    /// Get the frame variant.
    pub fn format(&self) -> FramingFormat {
        self.format
    }

    /// Wrap a message into one wire frame.
    pub fn frame(&self, message: &[u8]) -> Bytes {
        match self.format {
            FramingFormat::Escaping => {
                let mut out = Vec::with_capacity(message.len() + 6);
                out.push(BOF);
                let mut crc = Crc16::new();
                for &byte in message {
                    crc.update(byte);
                    push_escaped(&mut out, byte);
                }
                for byte in crc.value_bytes() {
                    push_escaped(&mut out, byte);
                }
                out.push(EOF);
                Bytes::from(out)
            }
            FramingFormat::NonEscaping => {
                let mut out = Vec::with_capacity(message.len() + 5);
                out.push(INVALID);
                out.extend_from_slice(&(message.len() as u32).to_be_bytes());
                out.extend_from_slice(message);
                Bytes::from(out)
            }
        }
    }

    /// Build a framed single-package keep-alive request.
    pub fn keep_alive_request(&self, slot: u8) -> Bytes {
        self.frame(&[
            slot,
            MESSAGE_ID,
            Command::KeepAliveRequest.to_byte(),
            FRAMING_VERSION,
        ])
    }

    /// Build a framed single-package keep-alive response.
    pub fn keep_alive_response(&self, slot: u8) -> Bytes {
        self.frame(&[
            slot,
            MESSAGE_ID,
            Command::KeepAliveResponse.to_byte(),
            FRAMING_VERSION,
        ])
    }

    /// Build a framed single-package provider-state message.
    pub fn provider_state(&self, slot: u8, state: ProviderState) -> Bytes {
        self.frame(&[
            slot,
            MESSAGE_ID,
            Command::ProviderState.to_byte(),
            FRAMING_VERSION,
            state as u8,
        ])
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::escaping()
    }
}

fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    if byte >= ESCAPE_THRESHOLD {
        out.push(CE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}
