//! Transport abstraction

use async_trait::async_trait;
use ember_core::EmberResult;

/// Bidirectional byte transport
#[async_trait]
pub trait Transport: Send {
    /// Open the transport connection.
    async fn open(&mut self) -> EmberResult<()>;

    /// Close the transport connection.
    async fn close(&mut self) -> EmberResult<()>;

    /// Read available bytes into the buffer, returning the count.
    /// Zero means the peer closed the connection.
    async fn read(&mut self, buf: &mut [u8]) -> EmberResult<usize>;

    /// Write the complete buffer.
    async fn write_all(&mut self, data: &[u8]) -> EmberResult<()>;

    /// Flush buffered outgoing bytes.
    async fn flush(&mut self) -> EmberResult<()>;

    /// Check whether the transport is closed.
    fn is_closed(&self) -> bool;
}
