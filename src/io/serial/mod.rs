// src/io/serial/mod.rs
//
// Serial port driver for the link engine.
//
// Features:
// - Device access behind `SerialLink`/`PortOpener` (system ports or loopback)
// - Blocking reader thread feeding the terminal buffer
// - Bounded write queue drained by a writer thread

mod config;
mod loopback;
mod port;
pub(crate) mod reader;
pub(crate) mod utils;
pub(crate) mod writer;

pub use config::{LinkConfig, MAX_BAUD, MAX_READ_TIMEOUT_MS, MIN_BAUD};
pub use loopback::{LoopbackDevice, LoopbackOpener};
pub use port::{
    list_ports, PortHandle, PortInfo, PortKind, PortOpener, SerialLink, SystemPortOpener, UsbIdentity,
    WRITE_CHUNK_SIZE,
};
pub use utils::{FlowControl, Parity, StopBits};
