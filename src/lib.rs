// src/lib.rs
//
// linkterm: the serial link engine behind a desktop serial terminal.
//
// A `LinkEngine` owns one serial port at a time, moves bytes between it and
// a bounded `TerminalBuffer`, and keeps the link alive across unplugs with a
// circuit breaker and a reconnect supervisor. UIs read the buffer through
// snapshots and follow changes on a broadcast event channel.

pub mod buffer_store;
mod engine;
pub mod io;
pub mod logging;
pub mod memory;
pub mod render;
pub mod settings;

pub use buffer_store::{
    BufferCaps, BufferRecord, Direction, SessionStats, Snapshot, TerminalBuffer,
};
pub use engine::LinkEngine;
pub use io::{
    list_ports, BreakerConfig, BreakerState, CircuitOpenError, ConfigError, ConnectError,
    FlowControl, LineEnding, LinkConfig, LinkEvent, LinkStatus, LoopbackDevice, Parity,
    PortInfo, PortKind, PortOpener, SendError, StopBits, TransportError, UsbIdentity,
};
pub use logging::init_logging;
pub use memory::{MemoryOptimizer, OptimizerConfig, SweepReport};
pub use render::{DisplayMode, DisplayOptions};
pub use settings::{default_settings_path, load_settings, save_settings, EngineSettings, SettingsError};
