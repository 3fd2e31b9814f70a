use crate::error::TicError;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Byte stream the session talks to the controller through.
pub trait Transport {
    /// Write all of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Drop whatever input is already buffered without waiting for more.
    /// Returns the number of bytes thrown away.
    fn discard_input(&mut self) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Adapts any tokio byte stream (serial port, pipe, test mock) to [`Transport`].
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn discard_input(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        // A zero timeout still polls the read once, so only ready bytes are taken
        loop {
            match timeout(Duration::ZERO, self.stream.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => return Ok(discarded),
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    return Ok(discarded);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

/// Transport over a real serial port.
pub type SerialTransport = StreamTransport<SerialStream>;

/// Open `port_name` at `baud_rate`.
pub fn open_serial(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<SerialTransport, TicError> {
    info!(port = port_name, baud_rate, "Opening serial port...");
    let stream = tokio_serial::new(port_name, baud_rate)
        .timeout(timeout)
        .open_native_async()?;
    info!("Serial port opened.");
    Ok(StreamTransport::new(stream))
}
