//! Byte stream abstraction for the device link

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::config::{TransportConfig, TransportKind};
use crate::error::ConnectError;

/// Anything the receive loop can read from and commands can be written to
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased device link
pub type BoxedStream = Box<dyn AsyncStream>;

/// Where the device can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Serial device, including a bound RFCOMM TTY such as `/dev/rfcomm0`
    Serial { path: String, baud_rate: u32 },
    /// TCP bridge to the device
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { path, baud_rate } => write!(f, "{} @ {} baud", path, baud_rate),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

impl Endpoint {
    /// Endpoint described by the `[transport]` configuration section
    #[must_use]
    pub fn from_config(config: &TransportConfig) -> Self {
        match config.kind {
            TransportKind::Serial => Self::Serial {
                path: config.address.clone(),
                baud_rate: config.baud_rate,
            },
            TransportKind::Tcp => Self::Tcp {
                host: config.address.clone(),
                port: config.port,
            },
        }
    }

    /// Open the link, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Unreachable`] if the device refuses or cannot be
    /// opened, and [`ConnectError::Timeout`] if it does not answer in time.
    pub async fn open(&self, timeout: Duration) -> Result<BoxedStream, ConnectError> {
        debug!("Opening {}", self);
        self.finish_open(timeout, self.open_inner()).await
    }

    /// Bounds `attempt` by `timeout` and maps its outcome to a [`ConnectError`].
    async fn finish_open<F>(&self, timeout: Duration, attempt: F) -> Result<BoxedStream, ConnectError>
    where
        F: Future<Output = std::io::Result<BoxedStream>>,
    {
        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(stream)) => {
                info!("Successfully opened {}", self);
                Ok(stream)
            }
            Ok(Err(source)) => Err(ConnectError::Unreachable {
                endpoint: self.to_string(),
                source,
            }),
            Err(_) => Err(ConnectError::Timeout {
                endpoint: self.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn open_inner(&self) -> std::io::Result<BoxedStream> {
        match self {
            Self::Serial { path, baud_rate } => {
                let port = tokio_serial::new(path, *baud_rate)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::None)
                    .stop_bits(tokio_serial::StopBits::One)
                    .flow_control(tokio_serial::FlowControl::None)
                    .open_native_async()?;
                Ok(Box::new(port))
            }
            Self::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
        }
    }
}
