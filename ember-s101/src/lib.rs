//! S101 framing layer for Ember+
//!
//! S101 slices an arbitrarily large encoded tree into bounded packages,
//! wraps each package into a self-delimiting wire frame (byte-stuffed and
//! CRC-protected, or length-prefixed in the non-escaping variant) and
//! reassembles the embedded BER stream on the receiving side. Keep-alive
//! and provider-state messages ride the same framing out of band.

pub mod crc;
pub mod frame;
pub mod framing_reader;
pub mod package;
pub mod reader;
pub mod writer;

pub use crc::Crc16;
pub use frame::{Framer, FramingFormat};
pub use framing_reader::{FramingEvent, FramingReader, PackageInfo};
pub use package::{
    flags, Command, ProviderState, DTD_GLOW, FRAMING_VERSION, MAX_PACKAGE_LENGTH, MESSAGE_ID,
    MIN_HEADER_LENGTH,
};
pub use reader::{Deframer, S101Event};
pub use writer::{OutgoingPackage, S101Writer};
