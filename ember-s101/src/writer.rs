//! S101 payload packet splitter
//!
//! [`S101Writer`] exposes a byte-sink surface for an encoded BER stream and
//! slices it into bounded packages. Bytes accumulate behind a payload
//! header; whenever the next byte would cross the configured maximum the
//! accumulated package is finalized *first*, so no package ever exceeds the
//! limit. [`finish`](S101Writer::finish) stamps the last-package flag and
//! always emits exactly one final package, empty-flagged when no payload
//! bytes were pending. Finished packages queue up as framed wire bytes for
//! the caller to drain and transmit.

use crate::frame::Framer;
use crate::package::{flags, Command, FRAMING_VERSION, MAX_PACKAGE_LENGTH, MESSAGE_ID, MIN_HEADER_LENGTH};
use bytes::Bytes;
use ember_core::{ByteSink, EmberResult};
use std::collections::VecDeque;

/// Finalized package ready for transmission
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingPackage {
    /// Framed wire bytes (escaped or length-prefixed).
    pub wire: Bytes,
    /// Number of unframed BER payload bytes carried by this package.
    pub payload_length: usize,
}

/// Splits an encoded byte stream into framed S101 payload packages
#[derive(Debug)]
pub struct S101Writer {
    framer: Framer,
    slot: u8,
    dtd: u8,
    app_bytes: Vec<u8>,
    max_package_length: usize,
    buf: Vec<u8>,
    is_first: bool,
    packages: VecDeque<OutgoingPackage>,
}

impl S101Writer {
    /// Create a writer for the given slot, DTD and maximum package length.
    ///
    /// # Panics
    /// Panics unless `MIN_HEADER_LENGTH < max_package_length <= MAX_PACKAGE_LENGTH`.
    pub fn new(slot: u8, dtd: u8, max_package_length: usize) -> Self {
        assert!(
            max_package_length > MIN_HEADER_LENGTH && max_package_length <= MAX_PACKAGE_LENGTH,
            "max package length {} outside ({}, {}]",
            max_package_length,
            MIN_HEADER_LENGTH,
            MAX_PACKAGE_LENGTH
        );
        let mut writer = Self {
            framer: Framer::escaping(),
            slot,
            dtd,
            app_bytes: Vec::new(),
            max_package_length,
            buf: Vec::new(),
            is_first: true,
            packages: VecDeque::new(),
        };
        writer.start_package();
        writer
    }

    /// Select the frame variant; the default is escaping.
    pub fn with_framer(mut self, framer: Framer) -> Self {
        self.framer = framer;
        self
    }

    /// Carry application bytes in every package header.
    ///
    /// # Panics
    /// Panics if the header plus application bytes would not leave room for
    /// payload within the configured maximum, or if more than 255
    /// application bytes are given.
    pub fn with_app_bytes(mut self, app_bytes: Vec<u8>) -> Self {
        assert!(app_bytes.len() <= u8::MAX as usize, "too many app bytes");
        assert!(
            MIN_HEADER_LENGTH + app_bytes.len() < self.max_package_length,
            "header with {} app bytes exceeds the package limit",
            app_bytes.len()
        );
        self.app_bytes = app_bytes;
        self.start_package();
        self
    }

    /// Slot id the writer stamps into every package.
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Append one payload byte, packaging first if it would cross the limit.
    pub fn write_payload_byte(&mut self, byte: u8) {
        if self.buf.len() >= self.max_package_length {
            self.emit(false);
        }
        self.buf.push(byte);
    }

    /// Append payload bytes.
    pub fn write_payload(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_payload_byte(byte);
        }
    }

    /// Finalize the current logical message.
    ///
    /// Exactly one package with the last flag is emitted, even when no
    /// payload bytes are pending (then carrying the empty flag as well).
    pub fn finish(&mut self) {
        self.emit(true);
    }

    /// Pop the next finished package.
    pub fn next_package(&mut self) -> Option<OutgoingPackage> {
        self.packages.pop_front()
    }

    /// Check whether finished packages are pending.
    pub fn has_packages(&self) -> bool {
        !self.packages.is_empty()
    }

    /// Number of payload bytes buffered for the next package.
    pub fn pending_payload(&self) -> usize {
        self.buf.len() - self.header_length()
    }

    fn header_length(&self) -> usize {
        MIN_HEADER_LENGTH + self.app_bytes.len()
    }

    fn start_package(&mut self) {
        self.buf.clear();
        self.buf.extend_from_slice(&[
            self.slot,
            MESSAGE_ID,
            Command::Payload.to_byte(),
            FRAMING_VERSION,
            0x00, // flags, stamped on emit
            self.dtd,
            self.app_bytes.len() as u8,
        ]);
        self.buf.extend_from_slice(&self.app_bytes);
    }

    fn emit(&mut self, last: bool) {
        let payload_length = self.pending_payload();
        let mut package_flags = 0;
        if self.is_first {
            package_flags |= flags::FIRST;
        }
        if last {
            package_flags |= flags::LAST;
            if payload_length == 0 {
                package_flags |= flags::EMPTY;
            }
        }
        self.buf[4] = package_flags;
        let wire = self.framer.frame(&self.buf);
        self.packages.push_back(OutgoingPackage {
            wire,
            payload_length,
        });
        self.is_first = last;
        self.start_package();
    }
}

impl ByteSink for S101Writer {
    fn write_byte(&mut self, value: u8) -> EmberResult<()> {
        self.write_payload_byte(value);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> EmberResult<()> {
        self.write_payload(buf);
        Ok(())
    }
}

impl Drop for S101Writer {
    /// A writer must not be released with unfinished payload bytes; call
    /// [`finish`](S101Writer::finish) first.
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(
                self.pending_payload() == 0,
                "S101Writer dropped with {} unfinished payload bytes",
                self.pending_payload()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::DTD_GLOW;
    use crate::reader::{Deframer, S101Event};

    fn unframe(package: &OutgoingPackage) -> Vec<u8> {
        let mut deframer = Deframer::new();
        deframer.feed(&package.wire);
        match deframer.next_event() {
            Some(S101Event::Message(message)) => message.to_vec(),
            other => panic!("expected message, got {:?}", other),
        }
    }

    fn drain(writer: &mut S101Writer) -> Vec<OutgoingPackage> {
        let mut packages = Vec::new();
        while let Some(package) = writer.next_package() {
            packages.push(package);
        }
        packages
    }

    #[test]
    fn test_exact_fit_is_a_single_package() {
        let max = 64;
        let mut writer = S101Writer::new(0, DTD_GLOW, max);
        writer.write_payload(&vec![0xAB; max - MIN_HEADER_LENGTH]);
        writer.finish();
        let packages = drain(&mut writer);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].payload_length, max - MIN_HEADER_LENGTH);
        let message = unframe(&packages[0]);
        assert_eq!(message.len(), max);
        assert_eq!(message[4], flags::FIRST | flags::LAST);
    }

    #[test]
    fn test_one_extra_byte_splits_into_two_packages() {
        let max = 64;
        let mut writer = S101Writer::new(0, DTD_GLOW, max);
        writer.write_payload(&vec![0xAB; max - MIN_HEADER_LENGTH + 1]);
        writer.finish();
        let packages = drain(&mut writer);
        assert_eq!(packages.len(), 2);

        let first = unframe(&packages[0]);
        assert_eq!(first.len(), max);
        assert_eq!(first[4], flags::FIRST);

        let second = unframe(&packages[1]);
        assert_eq!(second[4], flags::LAST);
        assert_eq!(packages[1].payload_length, 1);
    }

    #[test]
    fn test_finish_with_no_payload_emits_empty_package() {
        let mut writer = S101Writer::new(3, DTD_GLOW, 128);
        writer.finish();
        let packages = drain(&mut writer);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].payload_length, 0);
        let message = unframe(&packages[0]);
        assert_eq!(message.len(), MIN_HEADER_LENGTH);
        assert_eq!(message[4], flags::FIRST | flags::LAST | flags::EMPTY);
    }

    #[test]
    fn test_header_fields() {
        let mut writer = S101Writer::new(9, DTD_GLOW, 128).with_app_bytes(vec![0x11, 0x22]);
        writer.write_payload(&[0x61]);
        writer.finish();
        let message = unframe(&drain(&mut writer)[0]);
        assert_eq!(message[0], 9); // slot
        assert_eq!(message[1], MESSAGE_ID);
        assert_eq!(message[2], Command::Payload.to_byte());
        assert_eq!(message[3], FRAMING_VERSION);
        assert_eq!(message[5], DTD_GLOW);
        assert_eq!(message[6], 2); // app byte count
        assert_eq!(&message[7..9], &[0x11, 0x22]);
        assert_eq!(message[9], 0x61);
    }

    #[test]
    fn test_first_flag_resets_between_messages() {
        let mut writer = S101Writer::new(0, DTD_GLOW, 64);
        writer.write_payload(&[1, 2, 3]);
        writer.finish();
        writer.write_payload(&[4, 5, 6]);
        writer.finish();
        let packages = drain(&mut writer);
        assert_eq!(packages.len(), 2);
        for package in &packages {
            let message = unframe(package);
            assert_eq!(message[4], flags::FIRST | flags::LAST);
        }
    }

    #[test]
    fn test_no_package_exceeds_the_limit() {
        let max = 32;
        let mut writer = S101Writer::new(0, DTD_GLOW, max);
        writer.write_payload(&vec![0x55; 500]);
        writer.finish();
        let packages = drain(&mut writer);
        assert!(packages.len() > 1);
        let mut total_payload = 0;
        for (i, package) in packages.iter().enumerate() {
            let message = unframe(package);
            assert!(message.len() <= max, "package {} too long", i);
            total_payload += package.payload_length;
        }
        assert_eq!(total_payload, 500);
        let last = unframe(packages.last().unwrap());
        assert_eq!(last[4] & flags::LAST, flags::LAST);
        let first = unframe(&packages[0]);
        assert_eq!(first[4] & flags::FIRST, flags::FIRST);
    }

    #[test]
    #[should_panic(expected = "max package length")]
    fn test_rejects_out_of_range_maximum() {
        let _ = S101Writer::new(0, DTD_GLOW, MIN_HEADER_LENGTH);
    }

    #[test]
    #[should_panic(expected = "unfinished payload")]
    fn test_drop_with_pending_payload_panics() {
        let mut writer = S101Writer::new(0, DTD_GLOW, 64);
        writer.write_payload(&[1, 2, 3]);
        drop(writer);
    }
}
