//! emberplus - Rust implementation of the Ember+ protocol core
//!
//! Ember+ is an ASN.1 BER-based tree protocol for broadcast device control,
//! transported over S101 framing.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `ember-core`: error type, byte sink/source abstractions, leaf values
//! - `ember-ber`: BER tag/length/value codec and the streaming reader
//! - `ember-dom`: arena tree model, builders, decoders, validation hook
//! - `ember-s101`: S101 framing, packet splitting and reassembly
//! - `ember-transport`: async TCP edge
//!
//! # Usage
//!
//! ```no_run
//! use emberplus::ber::BerTag;
//! use emberplus::dom::EmberTree;
//! use emberplus::s101::S101Writer;
//!
//! let mut tree = EmberTree::new();
//! let root = tree.new_sequence(BerTag::application(1));
//! let leaf = tree.new_leaf(BerTag::context(0), 42i32);
//! tree.insert(root, leaf);
//! tree.set_root(root);
//!
//! let mut writer = S101Writer::new(0, emberplus::s101::DTD_GLOW, 1024);
//! tree.encode(&mut writer).unwrap();
//! writer.finish();
//! while let Some(package) = writer.next_package() {
//!     // hand package.wire to the transport
//! }
//! ```

// Re-export core types
pub use ember_core::{ByteSink, ByteSource, EmberError, EmberResult, LeafKind, LeafValue, MemoryBuffer};

// Re-export the BER codec
pub mod ber {
    pub use ember_ber::*;
}

// Re-export the DOM layer
pub mod dom {
    pub use ember_dom::*;
}

// Re-export the S101 framing layer
pub mod s101 {
    pub use ember_s101::*;
}

// Re-export the transport edge
pub mod transport {
    pub use ember_transport::*;
}
