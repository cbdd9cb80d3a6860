// src/io/mod.rs
//
// Serial link I/O: device access, the circuit breaker, and the threads that
// move bytes between one open port and the terminal buffer.
//
// `LinkShared` lives as long as the engine. `LinkContext` lives for one
// `connect`..`disconnect` span and is shared by that span's reader, writer
// and reconnect supervisor threads.

pub mod breaker;
pub mod codec;
mod error;
pub mod serial;
mod supervisor;
mod types;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, Permit, Transition};
pub use codec::{encode_text, parse_hex_input, LineEnding};
pub use error::{CircuitOpenError, ConfigError, ConnectError, SendError, TransportError};
pub use serial::{
    list_ports, FlowControl, LinkConfig, LoopbackDevice, LoopbackOpener, Parity, PortHandle,
    PortInfo, PortKind, PortOpener, SerialLink, StopBits, SystemPortOpener, UsbIdentity,
};
pub use types::{LinkEvent, LinkStatus, WriteRequest, WriteSender};

pub(crate) use supervisor::spawn_supervisor;

use chrono::Local;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::buffer_store::{Direction, TerminalBuffer};
use crate::settings::EngineSettings;

/// Slice used when sleeping so cancellation is noticed promptly.
const CANCEL_POLL: Duration = Duration::from_millis(10);

// ============================================================================
// Engine-wide state
// ============================================================================

pub(crate) struct LinkShared {
    pub settings: EngineSettings,
    pub opener: Arc<dyn PortOpener>,
    pub buffer: Arc<TerminalBuffer>,
    breaker: Mutex<CircuitBreaker>,
    status: Mutex<LinkStatus>,
    events: broadcast::Sender<LinkEvent>,
}

impl LinkShared {
    pub fn new(
        settings: EngineSettings,
        opener: Arc<dyn PortOpener>,
        buffer: Arc<TerminalBuffer>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            breaker: Mutex::new(CircuitBreaker::new(settings.breaker.clone())),
            settings,
            opener,
            buffer,
            status: Mutex::new(LinkStatus::Disconnected),
            events,
        }
    }

    pub fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Store a new status and notify subscribers if it changed.
    pub fn set_status(&self, status: LinkStatus) {
        {
            let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if *current == status {
                return;
            }
            *current = status.clone();
        }
        tracing::info!(status = ?status, "link status changed");
        self.emit(LinkEvent::StatusChanged(status));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: LinkEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    pub fn notify_buffer_updated(&self) {
        let next = self.buffer.next_seq();
        if next > 0 {
            self.emit(LinkEvent::BufferUpdated { last_seq: next - 1 });
        }
    }

    pub fn record_info(&self, message: impl Into<String>) {
        self.buffer.append_message(Direction::Info, message);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.buffer.stats().add_error();
        self.buffer.append_message(Direction::Error, message);
    }
}

// ============================================================================
// Per-connection state
// ============================================================================

pub(crate) struct LinkContext {
    pub shared: Arc<LinkShared>,
    pub session_id: String,
    pub config: LinkConfig,
    port: Mutex<Option<PortHandle>>,
    cancel: AtomicBool,
    pending_writes: AtomicUsize,
}

impl LinkContext {
    pub fn new(shared: Arc<LinkShared>, session_id: String, config: LinkConfig, port: PortHandle) -> Self {
        Self {
            shared,
            session_id,
            config,
            port: Mutex::new(Some(port)),
            cancel: AtomicBool::new(false),
            pending_writes: AtomicUsize::new(0),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// The port slot. `None` while the link is suspended.
    /// Never hold this guard while reporting a failure.
    pub fn port(&self) -> MutexGuard<'_, Option<PortHandle>> {
        self.port.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Like `port`, but gives up if a thread is stuck holding the slot.
    pub fn try_port(&self) -> Option<MutexGuard<'_, Option<PortHandle>>> {
        match self.port.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::Acquire)
    }

    pub fn write_queued(&self) {
        self.pending_writes.fetch_add(1, Ordering::AcqRel);
    }

    pub fn write_settled(&self) {
        // Saturating: a settle without a matching queue must not wrap
        let _ = self
            .pending_writes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Sleep for `duration`, waking early on cancellation.
    pub fn sleep_unless_cancelled(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }

    /// Record a transport failure and feed it to the breaker.
    pub fn report_failure(&self, err: TransportError) {
        self.fail(err, false);
    }

    /// The device vanished from the system: trip the breaker immediately.
    pub fn report_device_missing(&self) {
        let err = TransportError::DeviceMissing {
            port: self.config.port_name.clone(),
        };
        self.fail(err, true);
    }

    fn fail(&self, err: TransportError, force_open: bool) {
        if self.is_cancelled() {
            tracing::debug!(session_id = %self.session_id, error = %err, "failure after cancel ignored");
            return;
        }
        tracing::warn!(
            session_id = %self.session_id,
            port = %self.config.port_name,
            error = %err,
            "transport failure"
        );
        self.shared.record_error(err.to_string());

        let transition = {
            let mut breaker = self.shared.breaker();
            if force_open {
                breaker.force_open()
            } else {
                breaker.record_failure()
            }
        };
        if let Transition::Opened { attempt, cooldown } = transition {
            self.suspend(attempt, cooldown);
        }
        self.shared.notify_buffer_updated();
    }

    /// Close the port and tell the UI when the next reopen will happen.
    ///
    /// Runs under the port slot, as does `restore`, so the slot, breaker and
    /// status always change together.
    fn suspend(&self, attempt: u32, cooldown: Duration) {
        let mut slot = self.port();
        // An in-flight read can hold the slot past the cooldown; if the
        // supervisor restored the link meanwhile, this trip is stale
        if self.shared.breaker().state() == BreakerState::Closed {
            tracing::debug!(session_id = %self.session_id, "link restored before suspend; skipping");
            return;
        }
        if let Some(mut port) = slot.take() {
            port.close();
        }
        let next_attempt_at =
            Local::now() + chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        self.shared.record_info(format!(
            "Link to {} lost; reconnect attempt {} in {} ms",
            self.config.port_name,
            attempt,
            cooldown.as_millis()
        ));
        self.shared.set_status(LinkStatus::Reconnecting {
            attempt,
            next_attempt_at,
        });
    }

    /// Install a freshly reopened port and close the breaker.
    pub fn restore(&self, port: PortHandle) {
        {
            let mut slot = self.port();
            *slot = Some(port);
            self.shared.breaker().record_success();
            self.shared
                .record_info(format!("Reconnected to {}", self.config.port_name));
            self.shared.set_status(LinkStatus::Connected);
        }
        self.shared.notify_buffer_updated();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Poll `condition` for up to five seconds.
    pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    /// A connected context on `device` with fast timings and no threads running.
    pub fn test_context(device: &LoopbackDevice) -> Arc<LinkContext> {
        let settings = EngineSettings {
            breaker: BreakerConfig {
                trip_threshold: 3,
                base_backoff_ms: 20,
                max_backoff_ms: 200,
            },
            health_check_interval_ms: 30,
            ..EngineSettings::default()
        };
        let buffer = Arc::new(TerminalBuffer::new(settings.buffer.clone()));
        let opener: Arc<dyn PortOpener> = Arc::new(device.opener());
        let shared = Arc::new(LinkShared::new(settings, Arc::clone(&opener), buffer, 64));

        let mut config = LinkConfig::new(device.name(), 115_200);
        config.read_timeout_ms = 10;
        let port = PortHandle::open(opener.as_ref(), &config).expect("loopback opens");
        shared.set_status(LinkStatus::Connected);
        Arc::new(LinkContext::new(shared, "test-session".into(), config, port))
    }
}
