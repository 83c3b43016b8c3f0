//! Transport edge for Ember+ connections
//!
//! The protocol core is synchronous and I/O-free; this crate provides the
//! async edge that pumps bytes between a socket and the framing layer.
//! Callers read raw bytes here and feed them into a framing reader, and
//! write framed packages back out.

pub mod stream;
pub mod tcp;

pub use stream::Transport;
pub use tcp::{TcpSettings, TcpTransport};
