//! Core types and utilities for the Ember+ protocol stack
//!
//! This crate provides the error type, the byte sink/source abstractions,
//! the leaf value model and small helpers shared by the other crates.

pub mod error;
pub mod identifier;
pub mod io;
pub mod value;

pub use error::{EmberError, EmberResult};
pub use io::{ByteSink, ByteSource, MemoryBuffer};
pub use value::{LeafKind, LeafValue};
