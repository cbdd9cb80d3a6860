// src/io/serial/loopback.rs
//
// In-process simulated serial device.
//
// A `LoopbackDevice` is a cloneable handle to one simulated port. Test code
// injects inbound bytes, inspects what the engine wrote, and can unplug and
// replug the device to exercise recovery. With echo enabled, everything
// written is read back, which the CLI uses for its demo mode.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::config::LinkConfig;
use super::port::{PortOpener, SerialLink};
use crate::io::error::ConnectError;

#[derive(Default)]
struct DeviceState {
    present: bool,
    echo: bool,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    write_calls: usize,
    /// Bumped on every unplug so links opened earlier stay dead after a replug.
    generation: u64,
    open_attempts: usize,
    opens: usize,
    fail_writes: usize,
}

struct DeviceShared {
    name: String,
    state: Mutex<DeviceState>,
    readable: Condvar,
}

/// Handle to a simulated serial device.
#[derive(Clone)]
pub struct LoopbackDevice {
    shared: Arc<DeviceShared>,
}

impl LoopbackDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                name: name.into(),
                state: Mutex::new(DeviceState {
                    present: true,
                    ..DeviceState::default()
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// A device that reads back everything written to it.
    pub fn with_echo(name: impl Into<String>) -> Self {
        let device = Self::new(name);
        device.state().echo = true;
        device
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// An opener that only knows about this device.
    pub fn opener(&self) -> LoopbackOpener {
        LoopbackOpener {
            device: self.clone(),
        }
    }

    /// Queue bytes for the engine to read.
    pub fn inject(&self, data: &[u8]) {
        self.state().inbound.extend(data.iter().copied());
        self.shared.readable.notify_all();
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state().write_calls
    }

    /// Simulate removal: open links fail and reopening reports NotFound.
    pub fn unplug(&self) {
        let mut state = self.state();
        state.present = false;
        state.generation += 1;
        state.inbound.clear();
        drop(state);
        self.shared.readable.notify_all();
    }

    pub fn replug(&self) {
        self.state().present = true;
    }

    pub fn is_plugged(&self) -> bool {
        self.state().present
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state().fail_writes = count;
    }

    /// Calls to `open`, successful or not.
    pub fn open_attempts(&self) -> usize {
        self.state().open_attempts
    }

    /// Successful opens.
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Opener and link
// ============================================================================

/// `PortOpener` for a single loopback device.
#[derive(Clone)]
pub struct LoopbackOpener {
    device: LoopbackDevice,
}

impl PortOpener for LoopbackOpener {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ConnectError> {
        config.validate()?;
        let mut state = self.device.state();
        state.open_attempts += 1;
        if config.port_name != self.device.name() || !state.present {
            return Err(ConnectError::NotFound {
                port: config.port_name.clone(),
            });
        }
        state.opens += 1;
        Ok(Box::new(LoopbackLink {
            device: self.device.clone(),
            generation: state.generation,
            read_timeout: config.read_timeout(),
        }))
    }

    fn is_present(&self, port_name: &str) -> bool {
        port_name == self.device.name() && self.device.is_plugged()
    }
}

struct LoopbackLink {
    device: LoopbackDevice,
    generation: u64,
    read_timeout: Duration,
}

impl LoopbackLink {
    fn check_alive(&self, state: &DeviceState) -> io::Result<()> {
        if state.present && state.generation == self.generation {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device removed"))
        }
    }
}

impl SerialLink for LoopbackLink {
    fn name(&self) -> &str {
        self.device.name()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.read_timeout;
        let mut state = self.device.state();
        loop {
            self.check_alive(&state)?;
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
            }
            state = self
                .device
                .shared
                .readable
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.device.state();
        self.check_alive(&state)?;
        state.write_calls += 1;
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        state.written.extend_from_slice(data);
        if state.echo {
            state.inbound.extend(data.iter().copied());
            drop(state);
            self.device.shared.readable.notify_all();
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let state = self.device.state();
        self.check_alive(&state)
    }
}
