//! BER (Basic Encoding Rules) codec for Ember+
//!
//! This crate implements the X.690 subset used on the Ember+ wire: definite
//! and indefinite length forms, all four tag classes, high-tag-number form,
//! binary reals, UTF-8 strings and OID/relative-OID subidentifier chains.
//!
//! Every node on the wire is a pair of TLVs: an *outer* tag (the node's
//! position among its siblings, always constructed, never universal) whose
//! value starts with an *inner* type tag (universal or application class)
//! carrying the actual content. [`reader::StreamBerReader`] consumes such a
//! stream byte by byte and emits decode events; [`value`] holds the pure
//! content codecs shared by the streaming and one-shot paths.

pub mod reader;
pub mod types;
pub mod value;

pub use reader::{ContainerFrame, DecodeEvent, DecodedItem, StreamBerReader};
pub use types::{
    application_number, application_type, is_application_defined, type_label, type_tag, BerClass,
    BerLength, BerTag, APPLICATION_FLAG,
};

/// Numeric codes carried by structural decode errors.
pub mod codes {
    /// Outer tag was primitive or universal-class.
    pub const INVALID_OUTER_TAG: u32 = 101;
    /// Tag number needed more than the allowed continuation octets.
    pub const TAG_TOO_LONG: u32 = 102;
    /// Length field used more than the allowed octets.
    pub const LENGTH_TOO_LONG: u32 = 103;
    /// Outer length of zero (it must at least cover the inner header).
    pub const ZERO_OUTER_LENGTH: u32 = 104;
    /// Universal type number outside the valid range.
    pub const INVALID_UNIVERSAL_TYPE: u32 = 105;
    /// Context-specific or private class used as an inner type tag.
    pub const INVALID_INNER_TAG: u32 = 106;
    /// Primitive item claiming the indefinite length form.
    pub const PRIMITIVE_INDEFINITE: u32 = 107;
    /// Non-zero byte inside an indefinite-length terminator.
    pub const NONZERO_TERMINATOR: u32 = 108;
    /// Container consumed more bytes than its declared length.
    pub const END_OF_CONTAINER: u32 = 109;
    /// Terminator where no indefinite-length container was open.
    pub const UNEXPECTED_TERMINATOR: u32 = 110;
    /// Malformed primitive content (bad UTF-8, truncated real, ...).
    pub const INVALID_VALUE: u32 = 111;
}

use ember_core::EmberError;

/// Build a structural decode error with a numeric code and position trace.
pub(crate) fn decode_error(code: u32, message: impl Into<String>, trace: String) -> EmberError {
    EmberError::Decode {
        code,
        message: message.into(),
        trace,
    }
}
