//! Streaming BER reader
//!
//! [`StreamBerReader`] consumes an EmBER byte stream one byte at a time and
//! reconstructs the TLV stream incrementally. It keeps a stack of open
//! container frames and emits [`DecodeEvent`]s into an internal queue which
//! the caller drains after each feed call; feeding never blocks and never
//! performs I/O.
//!
//! A structural error leaves the reader in an undefined partial state: the
//! caller must invoke [`StreamBerReader::reset`] before feeding further
//! bytes.

use crate::types::{universal, BerClass, BerTag};
use crate::value::{MAX_LENGTH_OCTETS, MAX_TAG_OCTETS};
use crate::{codes, decode_error, type_label};
use ember_core::{EmberError, EmberResult};
use std::collections::VecDeque;
use std::mem;

const VALUE_PREALLOC_LIMIT: usize = 64 * 1024;

/// Decode state of the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Tag,
    Length,
    Value,
    Terminator,
}

/// Record of an open container on the reader stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFrame {
    /// Outer tag of the container
    pub tag: BerTag,
    /// Type number (application flag set for application-defined types)
    pub type_number: u32,
    /// Declared content length, `None` for the indefinite form
    pub length: Option<usize>,
    /// Content bytes consumed so far
    pub bytes_read: usize,
}

/// Fully decoded item (primitive or closed container)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedItem {
    /// Outer tag of the item
    pub tag: BerTag,
    /// Type number (application flag set for application-defined types)
    pub type_number: u32,
    /// Whether the item is a container
    pub is_container: bool,
    /// Content length; for indefinite containers, the bytes actually consumed
    pub length: usize,
    /// Raw content bytes; empty for containers
    pub value: Vec<u8>,
}

/// Event emitted by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A container header was fully parsed; its children follow.
    ContainerStart {
        tag: BerTag,
        type_number: u32,
        length: Option<usize>,
    },
    /// An item (primitive, or container whose extent is satisfied) is
    /// completely read.
    ItemReady(DecodedItem),
}

/// Streaming BER reader state machine
#[derive(Debug)]
pub struct StreamBerReader {
    state: DecodeState,
    stack: Vec<ContainerFrame>,
    events: VecDeque<DecodeEvent>,

    /// true while the next tag to parse is an outer tag
    reading_outer: bool,
    tag_first: Option<u8>,
    tag_acc: u64,
    tag_octets: usize,

    outer_tag: BerTag,
    type_number: u32,
    is_container: bool,

    length_started: bool,
    length_acc: usize,
    length_octets_remaining: usize,

    value: Vec<u8>,
    value_expected: usize,

    terminator_count: usize,
}

impl StreamBerReader {
    /// Create a reader positioned at a clean boundary.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Tag,
            stack: Vec::new(),
            events: VecDeque::new(),
            reading_outer: true,
            tag_first: None,
            tag_acc: 0,
            tag_octets: 0,
            outer_tag: BerTag::ZERO,
            type_number: 0,
            is_container: false,
            length_started: false,
            length_acc: 0,
            length_octets_remaining: 0,
            value: Vec::new(),
            value_expected: 0,
            terminator_count: 0,
        }
    }

    /// Feed a single byte into the state machine.
    ///
    /// Any events produced become available through [`next_event`]. On a
    /// structural error the reader must be [`reset`] before further use.
    ///
    /// [`next_event`]: StreamBerReader::next_event
    /// [`reset`]: StreamBerReader::reset
    pub fn feed_byte(&mut self, byte: u8) -> EmberResult<()> {
        if let Some(frame) = self.stack.last_mut() {
            frame.bytes_read += 1;
            if let Some(length) = frame.length {
                if frame.bytes_read > length {
                    return Err(self.error(codes::END_OF_CONTAINER, "unexpected end of container"));
                }
            }
        }

        match self.state {
            DecodeState::Tag => self.read_tag_byte(byte)?,
            DecodeState::Length => self.read_length_byte(byte)?,
            DecodeState::Value => self.read_value_byte(byte),
            DecodeState::Terminator => self.read_terminator_byte(byte)?,
        }

        if self.at_item_boundary() {
            self.close_completed_containers()?;
        }
        Ok(())
    }

    /// Feed a chunk of bytes; identical to feeding each byte in turn.
    pub fn feed(&mut self, bytes: &[u8]) -> EmberResult<()> {
        for &byte in bytes {
            self.feed_byte(byte)?;
        }
        Ok(())
    }

    /// Pop the next pending decode event.
    pub fn next_event(&mut self) -> Option<DecodeEvent> {
        self.events.pop_front()
    }

    /// Check whether events are pending.
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Check whether the reader sits at a clean boundary: no open
    /// containers and no partially parsed tag, length or value.
    ///
    /// Callers use this to detect a tree left incomplete when a new
    /// top-level message begins.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
            && self.state == DecodeState::Tag
            && self.reading_outer
            && self.tag_first.is_none()
    }

    /// Discard all partial state and pending events.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Open container frames, outermost first.
    pub fn open_containers(&self) -> &[ContainerFrame] {
        &self.stack
    }

    /// Chain of open container tag:type pairs, `"root"` when none are open.
    pub fn position_trace(&self) -> String {
        if self.stack.is_empty() {
            return "root".to_string();
        }
        self.stack
            .iter()
            .map(|frame| format!("{}:{}", frame.tag, type_label(frame.type_number)))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn error(&self, code: u32, message: impl Into<String>) -> EmberError {
        decode_error(code, message, self.position_trace())
    }

    fn at_item_boundary(&self) -> bool {
        self.state == DecodeState::Tag && self.reading_outer && self.tag_first.is_none()
    }

    fn read_tag_byte(&mut self, byte: u8) -> EmberResult<()> {
        match self.tag_first {
            None => {
                if self.reading_outer && byte == 0x00 {
                    // Not a tag: start of the indefinite-length terminator.
                    self.terminator_count = 1;
                    self.state = DecodeState::Terminator;
                    return Ok(());
                }
                self.tag_first = Some(byte);
                self.tag_acc = 0;
                self.tag_octets = 0;
                if byte & 0x1F != 0x1F {
                    self.tag_acc = u64::from(byte & 0x1F);
                    self.finish_tag()
                } else {
                    Ok(())
                }
            }
            Some(_) => {
                self.tag_octets += 1;
                if self.tag_octets > MAX_TAG_OCTETS {
                    return Err(self.error(
                        codes::TAG_TOO_LONG,
                        format!("tag exceeds {} continuation octets", MAX_TAG_OCTETS),
                    ));
                }
                self.tag_acc = (self.tag_acc << 7) | u64::from(byte & 0x7F);
                if self.tag_acc > u64::from(u32::MAX) {
                    return Err(self.error(codes::TAG_TOO_LONG, "tag number out of range"));
                }
                if byte & 0x80 == 0 {
                    self.finish_tag()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn finish_tag(&mut self) -> EmberResult<()> {
        let first = self.tag_first.take().expect("leading tag octet");
        let class = BerClass::from_bits(first);
        let constructed = first & 0x20 != 0;
        let number = self.tag_acc as u32;
        self.tag_octets = 0;

        if self.reading_outer {
            if !constructed || class == BerClass::Universal {
                return Err(self.error(
                    codes::INVALID_OUTER_TAG,
                    format!(
                        "outer tag must be a container-flagged non-universal tag, got {}",
                        BerTag::new(class, number)
                    ),
                ));
            }
            self.outer_tag = BerTag::new(class, number).as_container();
        } else {
            self.is_container = constructed;
            self.type_number = match class {
                BerClass::Universal => {
                    if number == 0 || number >= universal::LAST_UNIVERSAL {
                        return Err(self.error(
                            codes::INVALID_UNIVERSAL_TYPE,
                            format!("invalid universal type number {}", number),
                        ));
                    }
                    number
                }
                BerClass::Application => crate::types::application_type(number),
                BerClass::ContextSpecific | BerClass::Private => {
                    return Err(self.error(
                        codes::INVALID_INNER_TAG,
                        format!(
                            "implicit {} tag where a universal or application type was expected",
                            BerTag::new(class, number)
                        ),
                    ));
                }
            };
        }

        self.length_started = false;
        self.length_acc = 0;
        self.length_octets_remaining = 0;
        self.state = DecodeState::Length;
        Ok(())
    }

    fn read_length_byte(&mut self, byte: u8) -> EmberResult<()> {
        if !self.length_started {
            self.length_started = true;
            if byte & 0x80 == 0 {
                return self.finish_length(Some(byte as usize));
            }
            let count = (byte & 0x7F) as usize;
            if count == 0 {
                return self.finish_length(None);
            }
            if count + 1 > MAX_LENGTH_OCTETS {
                return Err(self.error(
                    codes::LENGTH_TOO_LONG,
                    format!("length field exceeds {} octets", MAX_LENGTH_OCTETS),
                ));
            }
            self.length_octets_remaining = count;
            self.length_acc = 0;
            return Ok(());
        }

        self.length_acc = (self.length_acc << 8) | byte as usize;
        self.length_octets_remaining -= 1;
        if self.length_octets_remaining == 0 {
            let length = self.length_acc;
            self.finish_length(Some(length))
        } else {
            Ok(())
        }
    }

    fn finish_length(&mut self, length: Option<usize>) -> EmberResult<()> {
        self.length_started = false;

        if self.reading_outer {
            if length == Some(0) {
                return Err(self.error(
                    codes::ZERO_OUTER_LENGTH,
                    "outer length must be non-zero (it covers the inner header)",
                ));
            }
            self.reading_outer = false;
            self.state = DecodeState::Tag;
            return Ok(());
        }

        // Both headers of the pair are known now.
        if self.is_container {
            self.events.push_back(DecodeEvent::ContainerStart {
                tag: self.outer_tag,
                type_number: self.type_number,
                length,
            });
            self.stack.push(ContainerFrame {
                tag: self.outer_tag,
                type_number: self.type_number,
                length,
                bytes_read: 0,
            });
            self.begin_node();
            return Ok(());
        }

        let Some(length) = length else {
            return Err(self.error(
                codes::PRIMITIVE_INDEFINITE,
                "primitive item claims indefinite length",
            ));
        };
        if length == 0 {
            self.fire_item(Vec::new(), 0);
        } else {
            self.value_expected = length;
            self.value = Vec::with_capacity(length.min(VALUE_PREALLOC_LIMIT));
            self.state = DecodeState::Value;
        }
        Ok(())
    }

    fn read_value_byte(&mut self, byte: u8) {
        self.value.push(byte);
        if self.value.len() == self.value_expected {
            let value = mem::take(&mut self.value);
            let length = self.value_expected;
            self.fire_item(value, length);
        }
    }

    fn read_terminator_byte(&mut self, byte: u8) -> EmberResult<()> {
        if byte != 0x00 {
            return Err(self.error(
                codes::NONZERO_TERMINATOR,
                format!("non-zero byte 0x{:02X} in terminator sequence", byte),
            ));
        }
        self.terminator_count += 1;
        if self.terminator_count == 4 {
            self.terminator_count = 0;
            self.close_indefinite()?;
            self.begin_node();
        }
        Ok(())
    }

    fn close_indefinite(&mut self) -> EmberResult<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(self.error(
                codes::UNEXPECTED_TERMINATOR,
                "terminator outside any container",
            ));
        };
        if frame.length.is_some() {
            self.stack.push(frame);
            return Err(self.error(
                codes::UNEXPECTED_TERMINATOR,
                "terminator inside a definite-length container",
            ));
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.bytes_read += frame.bytes_read;
            if let Some(length) = parent.length {
                if parent.bytes_read > length {
                    return Err(self.error(codes::END_OF_CONTAINER, "unexpected end of container"));
                }
            }
        }
        // Effective length: bytes consumed inside the container, terminator
        // excluded.
        self.events.push_back(DecodeEvent::ItemReady(DecodedItem {
            tag: frame.tag,
            type_number: frame.type_number,
            is_container: true,
            length: frame.bytes_read.saturating_sub(4),
            value: Vec::new(),
        }));
        Ok(())
    }

    /// Pop every definite-length container whose extent is now satisfied.
    /// Nested containers can end on the same byte, so this loops.
    fn close_completed_containers(&mut self) -> EmberResult<()> {
        loop {
            let complete = match self.stack.last() {
                Some(frame) => frame.length == Some(frame.bytes_read),
                None => false,
            };
            if !complete {
                return Ok(());
            }
            let frame = self.stack.pop().expect("completed frame");
            if let Some(parent) = self.stack.last_mut() {
                parent.bytes_read += frame.bytes_read;
                if let Some(length) = parent.length {
                    if parent.bytes_read > length {
                        return Err(
                            self.error(codes::END_OF_CONTAINER, "unexpected end of container")
                        );
                    }
                }
            }
            self.events.push_back(DecodeEvent::ItemReady(DecodedItem {
                tag: frame.tag,
                type_number: frame.type_number,
                is_container: true,
                length: frame.bytes_read,
                value: Vec::new(),
            }));
        }
    }

    fn fire_item(&mut self, value: Vec<u8>, length: usize) {
        self.events.push_back(DecodeEvent::ItemReady(DecodedItem {
            tag: self.outer_tag,
            type_number: self.type_number,
            is_container: false,
            length,
            value,
        }));
        self.begin_node();
    }

    fn begin_node(&mut self) {
        self.state = DecodeState::Tag;
        self.reading_outer = true;
        self.tag_first = None;
        self.tag_acc = 0;
        self.tag_octets = 0;
        self.outer_tag = BerTag::ZERO;
        self.type_number = 0;
        self.is_container = false;
        self.value_expected = 0;
    }
}

impl Default for StreamBerReader {
    fn default() -> Self {
        Self::new()
    }
}
