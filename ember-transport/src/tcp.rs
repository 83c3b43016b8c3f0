//! TCP transport implementation

use crate::stream::Transport;
use async_trait::async_trait;
use ember_core::{EmberError, EmberResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP transport settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create settings with the default 30 second timeout.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Create settings with an explicit timeout.
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            address,
            timeout: Some(timeout),
        }
    }
}

/// TCP transport for Ember+ connections
#[derive(Debug)]
pub struct TcpTransport {
    settings: TcpSettings,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create an unconnected transport.
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            stream: None,
        }
    }

    /// Wrap an already connected stream (e.g. an accepted connection).
    pub fn from_stream(stream: TcpStream, settings: TcpSettings) -> Self {
        Self {
            settings,
            stream: Some(stream),
        }
    }

    fn stream_mut(&mut self) -> EmberResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            EmberError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "TCP transport is not open",
            ))
        })
    }

    async fn with_timeout<T>(
        timeout: Option<Duration>,
        operation: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> EmberResult<T> {
        match timeout {
            Some(duration) => match tokio::time::timeout(duration, operation).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(EmberError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "TCP operation timed out",
                ))),
            },
            None => Ok(operation.await?),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> EmberResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let address = self.settings.address;
        let stream =
            Self::with_timeout(self.settings.timeout, TcpStream::connect(address)).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> EmberResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> EmberResult<usize> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;
        Self::with_timeout(timeout, stream.read(buf)).await
    }

    async fn write_all(&mut self, data: &[u8]) -> EmberResult<()> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;
        Self::with_timeout(timeout, stream.write_all(data)).await
    }

    async fn flush(&mut self) -> EmberResult<()> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;
        Self::with_timeout(timeout, stream.flush()).await
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}
