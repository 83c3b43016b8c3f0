//! Framing reader: S101 messages to the embedded BER stream
//!
//! [`FramingReader`] consumes raw transport bytes through an internal
//! [`Deframer`], validates each message header and routes the embedded BER
//! payload into a [`StreamBerReader`]. Out-of-band keep-alive and
//! provider-state traffic surfaces as events; a first-flagged payload
//! arriving while the BER reader still holds an open tree is reported as a
//! framing error and the reader is force-reset before the new payload
//! applies.
//!
//! Decode events of the embedded BER stream are drained from
//! [`ber_reader`](FramingReader::ber_reader), framing events from
//! [`next_event`](FramingReader::next_event).

use crate::frame::Framer;
use crate::package::{flags, Command, ProviderState, MESSAGE_ID, MIN_HEADER_LENGTH};
use crate::reader::{Deframer, S101Event};
use bytes::Bytes;
use ember_ber::StreamBerReader;
use std::collections::VecDeque;

/// Parsed header of a received package
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub slot: u8,
    pub command: Command,
    pub version: u8,
    /// Header flags; zero for non-payload commands.
    pub flags: u8,
    /// DTD identifier; zero for non-payload commands.
    pub dtd: u8,
    /// Application bytes; empty for non-payload commands.
    pub app_bytes: Vec<u8>,
    /// Embedded BER payload bytes carried by this package.
    pub payload_length: usize,
}

/// Event raised by the framing reader
#[derive(Debug, Clone, PartialEq)]
pub enum FramingEvent {
    /// A message with an unrecognized message id; no further processing.
    ForeignMessage(Bytes),
    /// Header of a recognized package, raised before any payload handling.
    PackageReceived(PackageInfo),
    /// A keep-alive request arrived; `response` is a framed keep-alive
    /// response ready for the caller to transmit.
    KeepAliveRequest { slot: u8, response: Bytes },
    /// The remote peer answered a keep-alive request.
    KeepAliveResponse { slot: u8 },
    /// The remote provider announced its state.
    ProviderState { slot: u8, state: ProviderState },
    /// Framing-level problem (corrupt frame, malformed header, abandoned
    /// tree); the reader remains usable.
    Error(String),
}

/// Consumes transport bytes and dispatches S101 messages
pub struct FramingReader {
    deframer: Deframer,
    ber: StreamBerReader,
    framer: Framer,
    events: VecDeque<FramingEvent>,
}

impl FramingReader {
    /// Create a framing reader synthesizing escaped keep-alive responses.
    pub fn new() -> Self {
        Self::with_framer(Framer::escaping())
    }

    /// Create a framing reader with an explicit frame variant for
    /// synthesized responses.
    pub fn with_framer(framer: Framer) -> Self {
        Self {
            deframer: Deframer::new(),
            ber: StreamBerReader::new(),
            framer,
            events: VecDeque::new(),
        }
    }

    /// Feed a single transport byte.
    pub fn feed_byte(&mut self, byte: u8) {
        self.deframer.feed_byte(byte);
        self.drain_deframer();
    }

    /// Feed a chunk of transport bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.deframer.feed(bytes);
        self.drain_deframer();
    }

    /// Pop the next pending framing event.
    pub fn next_event(&mut self) -> Option<FramingEvent> {
        self.events.pop_front()
    }

    /// The embedded BER reader; drain its decode events after feeding.
    pub fn ber_reader(&mut self) -> &mut StreamBerReader {
        &mut self.ber
    }

    /// Drop all partial framing and BER state.
    pub fn reset(&mut self) {
        self.deframer.reset();
        self.ber.reset();
        self.events.clear();
    }

    fn drain_deframer(&mut self) {
        while let Some(event) = self.deframer.next_event() {
            match event {
                S101Event::Message(message) => self.dispatch(message),
                S101Event::Error(message) => self.events.push_back(FramingEvent::Error(message)),
            }
        }
    }

    fn dispatch(&mut self, message: Bytes) {
        let slot = message[0];
        if message[1] != MESSAGE_ID {
            self.events
                .push_back(FramingEvent::ForeignMessage(message));
            return;
        }
        if message.len() < 4 {
            self.events.push_back(FramingEvent::Error(format!(
                "truncated S101 message of {} bytes",
                message.len()
            )));
            return;
        }
        let Some(command) = Command::from_byte(message[2]) else {
            self.events.push_back(FramingEvent::Error(format!(
                "unknown S101 command 0x{:02X}",
                message[2]
            )));
            return;
        };
        let version = message[3];

        match command {
            Command::Payload => self.dispatch_payload(slot, version, &message),
            Command::KeepAliveRequest => {
                self.events
                    .push_back(FramingEvent::PackageReceived(PackageInfo {
                        slot,
                        command,
                        version,
                        flags: 0,
                        dtd: 0,
                        app_bytes: Vec::new(),
                        payload_length: 0,
                    }));
                self.events.push_back(FramingEvent::KeepAliveRequest {
                    slot,
                    response: self.framer.keep_alive_response(slot),
                });
            }
            Command::KeepAliveResponse => {
                self.events
                    .push_back(FramingEvent::PackageReceived(PackageInfo {
                        slot,
                        command,
                        version,
                        flags: 0,
                        dtd: 0,
                        app_bytes: Vec::new(),
                        payload_length: 0,
                    }));
                self.events
                    .push_back(FramingEvent::KeepAliveResponse { slot });
            }
            Command::ProviderState => {
                let Some(state) = message.get(4).copied().and_then(ProviderState::from_byte)
                else {
                    self.events.push_back(FramingEvent::Error(
                        "malformed provider-state message".to_string(),
                    ));
                    return;
                };
                self.events
                    .push_back(FramingEvent::PackageReceived(PackageInfo {
                        slot,
                        command,
                        version,
                        flags: 0,
                        dtd: 0,
                        app_bytes: Vec::new(),
                        payload_length: 0,
                    }));
                self.events
                    .push_back(FramingEvent::ProviderState { slot, state });
            }
        }
    }

    fn dispatch_payload(&mut self, slot: u8, version: u8, message: &Bytes) {
        if message.len() < MIN_HEADER_LENGTH {
            self.events.push_back(FramingEvent::Error(format!(
                "payload package of {} bytes is shorter than the header",
                message.len()
            )));
            return;
        }
        let package_flags = message[4];
        let dtd = message[5];
        let app_count = message[6] as usize;
        let payload_offset = MIN_HEADER_LENGTH + app_count;
        if message.len() < payload_offset {
            self.events.push_back(FramingEvent::Error(format!(
                "application bytes ({}) exceed the message",
                app_count
            )));
            return;
        }
        let app_bytes = message[MIN_HEADER_LENGTH..payload_offset].to_vec();
        let payload = &message[payload_offset..];

        if package_flags & flags::FIRST != 0 && !self.ber.is_empty() {
            let trace = self.ber.position_trace();
            log::warn!("previous tree abandoned mid-stream at {}", trace);
            self.events.push_back(FramingEvent::Error(format!(
                "incomplete tree abandoned at {}",
                trace
            )));
            self.ber.reset();
        }

        self.events
            .push_back(FramingEvent::PackageReceived(PackageInfo {
                slot,
                command: Command::Payload,
                version,
                flags: package_flags,
                dtd,
                app_bytes,
                payload_length: payload.len(),
            }));

        for &byte in payload {
            if let Err(error) = self.ber.feed_byte(byte) {
                self.events
                    .push_back(FramingEvent::Error(error.to_string()));
                self.ber.reset();
                break;
            }
        }
    }
}

impl Default for FramingReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::DTD_GLOW;
    use crate::writer::S101Writer;
    use ember_ber::DecodeEvent;

    /// App-1 sequence holding one context-0 integer leaf of 42.
    const TREE_BYTES: [u8; 9] = [0x61, 0x07, 0x30, 0x05, 0xA0, 0x03, 0x02, 0x01, 0x2A];

    fn collect(reader: &mut FramingReader) -> Vec<FramingEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.next_event() {
            events.push(event);
        }
        events
    }

    fn payload_message(payload: &[u8]) -> Vec<Bytes> {
        let mut writer = S101Writer::new(0, DTD_GLOW, 64);
        writer.write_payload(payload);
        writer.finish();
        let mut wires = Vec::new();
        while let Some(package) = writer.next_package() {
            wires.push(package.wire);
        }
        wires
    }

    #[test]
    fn test_payload_reaches_the_ber_reader() {
        let mut reader = FramingReader::new();
        for wire in payload_message(&TREE_BYTES) {
            reader.feed(&wire);
        }
        let events = collect(&mut reader);
        assert!(matches!(
            events[0],
            FramingEvent::PackageReceived(PackageInfo {
                command: Command::Payload,
                dtd: DTD_GLOW,
                ..
            })
        ));

        let mut decode_events = 0;
        while reader.ber_reader().next_event().is_some() {
            decode_events += 1;
        }
        assert_eq!(decode_events, 3);
        assert!(reader.ber_reader().is_empty());
    }

    #[test]
    fn test_keep_alive_round_trip() {
        let mut reader = FramingReader::new();
        reader.feed(&Framer::escaping().keep_alive_request(5));
        let events = collect(&mut reader);
        assert!(matches!(
            events[0],
            FramingEvent::PackageReceived(PackageInfo {
                slot: 5,
                command: Command::KeepAliveRequest,
                ..
            })
        ));
        let FramingEvent::KeepAliveRequest { slot, response } = &events[1] else {
            panic!("expected keep-alive request event");
        };
        assert_eq!(*slot, 5);

        // Feeding the synthesized response through a second reader yields a
        // keep-alive response for the same slot.
        let mut peer = FramingReader::new();
        peer.feed(response);
        let peer_events = collect(&mut peer);
        assert!(matches!(
            peer_events[1],
            FramingEvent::KeepAliveResponse { slot: 5 }
        ));
    }

    #[test]
    fn test_provider_state() {
        let mut reader = FramingReader::new();
        reader.feed(&Framer::escaping().provider_state(2, ProviderState::Active));
        let events = collect(&mut reader);
        assert!(matches!(
            events[1],
            FramingEvent::ProviderState {
                slot: 2,
                state: ProviderState::Active
            }
        ));
    }

    #[test]
    fn test_foreign_message_id_is_surfaced_not_processed() {
        let mut reader = FramingReader::new();
        let foreign = Framer::escaping().frame(&[0x00, 0x77, 0x01, 0x02]);
        reader.feed(&foreign);
        let events = collect(&mut reader);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FramingEvent::ForeignMessage(_)));
        assert!(reader.ber_reader().next_event().is_none());
    }

    #[test]
    fn test_abandoned_tree_detection_and_recovery() {
        let mut reader = FramingReader::new();

        // First message carries only a prefix of a tree.
        for wire in payload_message(&TREE_BYTES[..5]) {
            reader.feed(&wire);
        }
        collect(&mut reader);
        assert!(!reader.ber_reader().is_empty());

        // A new first-flagged message arrives: error + forced reset, then
        // the fresh tree decodes completely.
        for wire in payload_message(&TREE_BYTES) {
            reader.feed(&wire);
        }
        let events = collect(&mut reader);
        match &events[0] {
            FramingEvent::Error(message) => {
                assert!(message.contains("abandoned"), "got {:?}", message);
                assert!(message.contains("A-1:Sequence"), "got {:?}", message);
            }
            other => panic!("expected error event, got {:?}", other),
        }

        let mut items = 0;
        while let Some(event) = reader.ber_reader().next_event() {
            if matches!(event, DecodeEvent::ItemReady(_)) {
                items += 1;
            }
        }
        assert_eq!(items, 2);
        assert!(reader.ber_reader().is_empty());
    }

    #[test]
    fn test_ber_error_resets_embedded_reader() {
        let mut reader = FramingReader::new();
        // 0x30 is an invalid (universal) outer tag
        for wire in payload_message(&[0x30, 0x03]) {
            reader.feed(&wire);
        }
        let events = collect(&mut reader);
        assert!(events
            .iter()
            .any(|event| matches!(event, FramingEvent::Error(_))));
        assert!(reader.ber_reader().is_empty());
    }

    #[test]
    fn test_split_message_reassembles() {
        // Force the tree across multiple tiny packages.
        let mut writer = S101Writer::new(0, DTD_GLOW, 10);
        writer.write_payload(&TREE_BYTES);
        writer.finish();
        let mut reader = FramingReader::new();
        let mut packages = 0;
        while let Some(package) = writer.next_package() {
            packages += 1;
            reader.feed(&package.wire);
        }
        assert!(packages > 1);
        collect(&mut reader);
        let mut items = 0;
        while let Some(event) = reader.ber_reader().next_event() {
            if matches!(event, DecodeEvent::ItemReady(_)) {
                items += 1;
            }
        }
        assert_eq!(items, 2);
        assert!(reader.ber_reader().is_empty());
    }
}
