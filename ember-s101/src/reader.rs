//! Streaming S101 deframer
//!
//! Consumes raw transport bytes one at a time and reassembles complete,
//! validated messages. Corrupt frames (bad CRC, broken escape sequences,
//! oversized bodies) are reported as error events; the deframer always
//! stays ready for the next incoming byte.

use crate::crc::Crc16;
use crate::frame::{BOF, CE, EOF, ESCAPE_THRESHOLD, ESCAPE_XOR, INVALID};
use bytes::Bytes;
use std::collections::VecDeque;

/// Upper bound on the unescaped body of a received escaping frame.
pub const MAX_FRAME_LENGTH: usize = 4096;

/// Upper bound on the declared length of a non-escaping frame.
pub const MAX_NON_ESCAPING_LENGTH: usize = 65536;

/// Event produced by the deframer
#[derive(Debug, Clone, PartialEq)]
pub enum S101Event {
    /// A complete validated message (CRC stripped), at least 2 bytes.
    Message(Bytes),
    /// A framing-level problem; the deframer remains usable.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeframeState {
    Idle,
    InFrame,
    NonEscapingLength,
    NonEscapingBody,
}

/// Reassembles S101 messages from a raw byte stream
#[derive(Debug)]
pub struct Deframer {
    state: DeframeState,
    buf: Vec<u8>,
    crc: Crc16,
    escaped: bool,
    length_bytes: [u8; 4],
    length_got: usize,
    remaining: usize,
    events: VecDeque<S101Event>,
}

impl Deframer {
    /// Create a deframer waiting for a frame start.
    pub fn new() -> Self {
        Self {
            state: DeframeState::Idle,
            buf: Vec::new(),
            crc: Crc16::new(),
            escaped: false,
            length_bytes: [0; 4],
            length_got: 0,
            remaining: 0,
            events: VecDeque::new(),
        }
    }

    /// Feed a single transport byte.
    pub fn feed_byte(&mut self, byte: u8) {
        match self.state {
            DeframeState::Idle => match byte {
                BOF => self.start_frame(),
                INVALID => {
                    self.length_got = 0;
                    self.state = DeframeState::NonEscapingLength;
                }
                other => {
                    log::debug!("skipping out-of-frame byte 0x{:02X}", other);
                }
            },
            DeframeState::InFrame => self.frame_byte(byte),
            DeframeState::NonEscapingLength => {
                self.length_bytes[self.length_got] = byte;
                self.length_got += 1;
                if self.length_got == 4 {
                    let length = u32::from_be_bytes(self.length_bytes) as usize;
                    if length < 2 {
                        self.error(format!("non-escaping frame too short: {} bytes", length));
                        self.state = DeframeState::Idle;
                    } else if length > MAX_NON_ESCAPING_LENGTH {
                        self.error(format!("non-escaping frame too long: {} bytes", length));
                        self.state = DeframeState::Idle;
                    } else {
                        self.buf.clear();
                        self.remaining = length;
                        self.state = DeframeState::NonEscapingBody;
                    }
                }
            }
            DeframeState::NonEscapingBody => {
                self.buf.push(byte);
                self.remaining -= 1;
                if self.remaining == 0 {
                    let message = Bytes::from(std::mem::take(&mut self.buf));
                    self.events.push_back(S101Event::Message(message));
                    self.state = DeframeState::Idle;
                }
            }
        }
    }

    /// Feed a chunk of transport bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed_byte(byte);
        }
    }

    /// Pop the next pending event.
    pub fn next_event(&mut self) -> Option<S101Event> {
        self.events.pop_front()
    }

    /// Drop any partial frame and pending events.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn start_frame(&mut self) {
        self.state = DeframeState::InFrame;
        self.buf.clear();
        self.crc.reset();
        self.escaped = false;
    }

    fn frame_byte(&mut self, byte: u8) {
        if self.escaped {
            if byte >= ESCAPE_THRESHOLD {
                self.error("control byte after escape marker");
                self.state = DeframeState::Idle;
                self.escaped = false;
                return;
            }
            self.escaped = false;
            self.push_body_byte(byte ^ ESCAPE_XOR);
            return;
        }
        match byte {
            BOF => {
                // The previous frame was cut short; start over.
                self.error("unexpected frame start inside frame");
                self.start_frame();
            }
            EOF => self.finish_frame(),
            CE => self.escaped = true,
            other if other >= ESCAPE_THRESHOLD => {
                self.error(format!("unescaped control byte 0x{:02X} in frame", other));
                self.state = DeframeState::Idle;
            }
            other => self.push_body_byte(other),
        }
    }

    fn push_body_byte(&mut self, byte: u8) {
        if self.buf.len() >= MAX_FRAME_LENGTH {
            self.error(format!("frame exceeds {} bytes", MAX_FRAME_LENGTH));
            self.state = DeframeState::Idle;
            return;
        }
        self.crc.update(byte);
        self.buf.push(byte);
    }

    fn finish_frame(&mut self) {
        self.state = DeframeState::Idle;
        if self.buf.len() < 4 {
            self.error("frame too short");
            return;
        }
        if !self.crc.is_valid() {
            self.error("CRC mismatch");
            return;
        }
        let mut body = std::mem::take(&mut self.buf);
        body.truncate(body.len() - 2);
        self.events.push_back(S101Event::Message(Bytes::from(body)));
    }

    fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("S101 framing error: {}", message);
        self.events.push_back(S101Event::Error(message));
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}
