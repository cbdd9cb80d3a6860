// src/io/serial/config.rs
//
// Link configuration: everything needed to open a serial device.
// Immutable once a link is open; changing it means close and reopen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::utils::{FlowControl, Parity, StopBits};
use crate::io::error::ConfigError;

pub const MIN_BAUD: u32 = 50;
pub const MAX_BAUD: u32 = 4_000_000;
/// Longest read timeout accepted. Bounds how late the reader notices cancellation.
pub const MAX_READ_TIMEOUT_MS: u64 = 10_000;

fn default_baud_rate() -> u32 {
    115_200
}

fn default_data_bits() -> u8 {
    8
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_write_timeout_ms() -> u64 {
    1_000
}

/// Serial port configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub port_name: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub flow_control: FlowControl,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl LinkConfig {
    /// 8N1 with no flow control at the given baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    /// Reject configurations that can never be opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_name.trim().is_empty() {
            return Err(ConfigError::EmptyPortName);
        }
        if !(MIN_BAUD..=MAX_BAUD).contains(&self.baud_rate) {
            return Err(ConfigError::BaudRate(self.baud_rate));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::DataBits(self.data_bits));
        }
        if self.stop_bits == StopBits::OnePointFive && self.data_bits != 5 {
            return Err(ConfigError::OnePointFiveStopBits(self.data_bits));
        }
        if self.read_timeout_ms == 0 || self.read_timeout_ms > MAX_READ_TIMEOUT_MS {
            return Err(ConfigError::ReadTimeout {
                got: self.read_timeout_ms,
                max: MAX_READ_TIMEOUT_MS,
            });
        }
        Ok(())
    }
}

impl fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} baud ({}{}{})",
            self.port_name,
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits.label()
        )
    }
}
