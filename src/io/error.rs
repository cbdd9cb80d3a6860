// src/io/error.rs
//
// Typed errors for the serial link engine.
//
// Configuration and open failures are returned synchronously from `connect`.
// Transport failures during a live session never reach the caller; they are
// recorded in the terminal buffer and fed to the circuit breaker instead.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

/// A `LinkConfig` that can never be opened, rejected before touching the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port name is empty")]
    EmptyPortName,
    #[error("baud rate {0} is out of range (50..=4000000)")]
    BaudRate(u32),
    #[error("{0} data bits is not supported (expected 5, 6, 7 or 8)")]
    DataBits(u8),
    #[error("1.5 stop bits requires 5 data bits, got {0}")]
    OnePointFiveStopBits(u8),
    #[error("read timeout must be between 1 and {max} ms, got {got}")]
    ReadTimeout { got: u64, max: u64 },
}

// ============================================================================
// Connect
// ============================================================================

/// Failure to open the serial device.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{port}: device not found")]
    NotFound { port: String },
    #[error("{port}: permission denied")]
    PermissionDenied { port: String },
    #[error("{port}: device is busy")]
    Busy { port: String },
    #[error("{port}: {what} is not supported by this backend")]
    Unsupported { port: String, what: &'static str },
    #[error("{port}: {source}")]
    Io {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectError {
    /// Classify an OS-level I/O error raised while opening `port`.
    pub fn from_io(port: &str, source: std::io::Error) -> Self {
        let port = port.to_string();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { port },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { port },
            _ if is_busy_message(&source.to_string()) => Self::Busy { port },
            _ => Self::Io { port, source },
        }
    }

    /// Classify an error from the `serialport` crate.
    pub fn from_serialport(port: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::NotFound {
                port: port.to_string(),
            },
            _ => Self::from_io(port, std::io::Error::from(err)),
        }
    }

    /// Whether retrying the same open later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Busy { .. } | Self::Io { .. })
    }
}

fn is_busy_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("busy") || lower.contains("in use")
}

// ============================================================================
// Transport
// ============================================================================

/// A recoverable failure during an open session. Drives the circuit breaker.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("device closed the stream")]
    EndOfStream,
    #[error("{port} is no longer present")]
    DeviceMissing { port: String },
    #[error("reopen failed: {0}")]
    Reopen(#[source] ConnectError),
}

// ============================================================================
// Circuit breaker / send
// ============================================================================

/// I/O was attempted while the circuit breaker is not closed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("link circuit is open; retry in {} ms", retry_in.as_millis())]
pub struct CircuitOpenError {
    pub retry_in: Duration,
}

/// Why `send` refused a payload. Nothing was queued in any of these cases.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
    #[error("write queue is full ({capacity} writes pending)")]
    QueueFull { capacity: usize },
    #[error("not connected")]
    NotConnected,
    #[error("nothing to send")]
    Empty,
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("invalid hex input: {0}")]
    InvalidHex(String),
}
