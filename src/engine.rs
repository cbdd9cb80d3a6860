// src/engine.rs
//
// The link engine: the single entry point a UI talks to.
//
// Owns at most one open serial link at a time. `connect` opens the port
// synchronously and starts the reader, writer and supervisor threads;
// `disconnect` stops them within a bounded time. Everything after connect
// (transport errors, reconnects, traffic) is reported through the terminal
// buffer, the status, and the event channel rather than as return values.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::buffer_store::{Direction, SessionStats, Snapshot, TerminalBuffer};
use crate::io::serial::reader::spawn_reader;
use crate::io::serial::writer::{spawn_writer, WriteQueue, MAX_PAYLOAD_BYTES};
use crate::io::{
    encode_text, parse_hex_input, spawn_supervisor, BreakerState, ConnectError, LineEnding,
    LinkConfig, LinkContext, LinkEvent, LinkShared, LinkStatus, PortHandle, PortOpener,
    SendError, SystemPortOpener, WriteRequest,
};
use crate::memory::{MemoryOptimizer, SweepReport};
use crate::render::DisplayOptions;
use crate::settings::EngineSettings;

/// Capacity of the UI event channel. Slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Poll interval while waiting for threads to stop.
const JOIN_POLL: Duration = Duration::from_millis(5);

struct ActiveLink {
    ctx: Arc<LinkContext>,
    writes: WriteQueue,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct LinkEngine {
    shared: Arc<LinkShared>,
    active: Mutex<Option<ActiveLink>>,
    /// Serializes connect and disconnect without blocking `send`.
    lifecycle: Mutex<()>,
    optimizer: Mutex<MemoryOptimizer>,
}

impl LinkEngine {
    /// An engine that opens real serial ports.
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_opener(settings, Arc::new(SystemPortOpener))
    }

    pub fn with_opener(settings: EngineSettings, opener: Arc<dyn PortOpener>) -> Self {
        let buffer = Arc::new(TerminalBuffer::new(settings.buffer.clone()));
        buffer.set_display_options(settings.display);

        let mut optimizer = MemoryOptimizer::new(Arc::clone(&buffer), settings.optimizer.clone());
        if let Err(e) = optimizer.start() {
            // Hard caps still hold without it
            tracing::warn!(error = %e, "memory optimizer failed to start");
        }

        let shared = Arc::new(LinkShared::new(settings, opener, buffer, EVENT_CAPACITY));
        Self {
            shared,
            active: Mutex::new(None),
            lifecycle: Mutex::new(()),
            optimizer: Mutex::new(optimizer),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open `config` and start streaming. Any existing link is closed first.
    ///
    /// Configuration and open failures are returned here; nothing is started.
    pub fn connect(&self, config: LinkConfig) -> Result<(), ConnectError> {
        config.validate()?;
        let _lifecycle = self.lock_lifecycle();

        let previous = self.lock_active().take();
        if let Some(previous) = previous {
            self.shutdown(previous);
        }

        let port = match PortHandle::open(self.shared.opener.as_ref(), &config) {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!(port = %config.port_name, error = %e, "connect failed");
                self.shared.record_error(format!("Failed to open {}: {}", config.port_name, e));
                self.shared.notify_buffer_updated();
                return Err(e);
            }
        };

        if !self.shared.settings.keep_buffer_across_sessions {
            self.shared.buffer.clear();
            self.shared.emit(LinkEvent::BufferCleared);
        }
        self.shared.buffer.stats().start_session();
        self.shared.breaker().reset();

        let session_id = Uuid::new_v4().to_string();
        let ctx = Arc::new(LinkContext::new(
            Arc::clone(&self.shared),
            session_id.clone(),
            config.clone(),
            port,
        ));
        let (writes, write_rx) =
            WriteQueue::channel(Arc::clone(&ctx), self.shared.settings.write_queue_capacity);

        let mut threads = Vec::with_capacity(3);
        if let Err(e) = spawn_link_threads(&ctx, write_rx, &mut threads) {
            tracing::error!(error = %e, "failed to start link threads");
            self.shutdown(ActiveLink { ctx, writes, threads });
            return Err(ConnectError::Io {
                port: config.port_name,
                source: e,
            });
        }

        tracing::info!(session_id = %session_id, link = %config, "connected");
        self.shared.record_info(format!("Connected to {}", config));
        self.shared.set_status(LinkStatus::Connected);
        self.shared.notify_buffer_updated();

        *self.lock_active() = Some(ActiveLink { ctx, writes, threads });
        Ok(())
    }

    /// Stop the link and release the port. Safe to call in any state.
    pub fn disconnect(&self) {
        let _lifecycle = self.lock_lifecycle();
        let active = self.lock_active().take();
        if let Some(active) = active {
            self.shutdown(active);
        }
    }

    fn shutdown(&self, active: ActiveLink) {
        let ActiveLink { ctx, writes, threads } = active;
        ctx.cancel();
        // Closing the channel wakes the writer
        drop(writes);

        let timeout = self.shared.settings.join_timeout();
        let deadline = Instant::now() + timeout;
        let mut stuck = Vec::new();
        for (name, handle) in threads {
            if !join_until(handle, deadline) {
                stuck.push(name);
            }
        }

        // A stuck thread may still hold the port slot
        match ctx.try_port() {
            Some(mut slot) => {
                if let Some(mut port) = slot.take() {
                    port.close();
                }
            }
            None => tracing::error!(port = %ctx.config.port_name, "port slot still held; leaking handle"),
        }

        if !stuck.is_empty() {
            tracing::error!(threads = ?stuck, timeout_ms = timeout.as_millis() as u64, "link threads did not stop");
            self.shared.record_error(format!(
                "{} thread(s) did not stop within {} ms; link closed forcibly",
                stuck.join(", "),
                timeout.as_millis()
            ));
        }

        self.shared.buffer.stats().end_session();
        self.shared
            .record_info(format!("Disconnected from {}", ctx.config.port_name));
        self.shared.set_status(LinkStatus::Disconnected);
        self.shared.notify_buffer_updated();
        tracing::info!(session_id = %ctx.session_id, "disconnected");
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Queue raw bytes. Returns immediately; delivery shows up as a TX record.
    pub fn send(&self, data: &[u8]) -> Result<(), SendError> {
        if data.is_empty() {
            return Err(SendError::Empty);
        }
        if data.len() > MAX_PAYLOAD_BYTES {
            return Err(SendError::PayloadTooLarge {
                len: data.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let active = self.lock_active();
        let link = active.as_ref().ok_or(SendError::NotConnected)?;
        self.shared.breaker().check()?;
        link.writes.enqueue(data.to_vec())
    }

    /// Send text followed by `ending`.
    pub fn send_text(&self, text: &str, ending: LineEnding) -> Result<(), SendError> {
        self.send(&encode_text(text, ending))
    }

    /// Send bytes typed as hex, e.g. `41 54 0D 0A`.
    pub fn send_hex(&self, input: &str) -> Result<(), SendError> {
        let data = parse_hex_input(input)?;
        self.send(&data)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self, from_seq: u64, count: usize) -> Snapshot {
        self.shared.buffer.snapshot(from_seq, count)
    }

    pub fn tail(&self, count: usize) -> Snapshot {
        self.shared.buffer.tail(count)
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.buffer.stats().snapshot()
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.subscribe()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.shared.breaker().state()
    }

    pub fn buffer(&self) -> Arc<TerminalBuffer> {
        Arc::clone(&self.shared.buffer)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// Configuration of the open link, if any.
    pub fn link_config(&self) -> Option<LinkConfig> {
        self.lock_active().as_ref().map(|a| a.ctx.config.clone())
    }

    /// Session id of the open link, if any.
    pub fn session_id(&self) -> Option<String> {
        self.lock_active().as_ref().map(|a| a.ctx.session_id.clone())
    }

    // ========================================================================
    // Buffer control
    // ========================================================================

    /// Drop all records and reset the counters.
    pub fn clear(&self) {
        self.shared.buffer.clear();
        self.shared.emit(LinkEvent::BufferCleared);
    }

    pub fn set_display_options(&self, options: DisplayOptions) {
        self.shared.buffer.set_display_options(options);
    }

    /// Run a memory sweep now instead of waiting for the optimizer.
    pub fn sweep_memory(&self) -> SweepReport {
        self.optimizer.lock().unwrap_or_else(|e| e.into_inner()).sweep()
    }

    /// Record an informational line, e.g. a UI-side notice.
    pub fn note(&self, message: impl Into<String>) {
        self.shared.buffer.append_message(Direction::Info, message);
        self.shared.notify_buffer_updated();
    }
}

impl Drop for LinkEngine {
    fn drop(&mut self) {
        self.disconnect();
        self.optimizer.lock().unwrap_or_else(|e| e.into_inner()).stop();
        self.shared.buffer.clear();
    }
}

fn spawn_link_threads(
    ctx: &Arc<LinkContext>,
    write_rx: Receiver<WriteRequest>,
    threads: &mut Vec<(&'static str, JoinHandle<()>)>,
) -> std::io::Result<()> {
    threads.push(("reader", spawn_reader(Arc::clone(ctx))?));
    threads.push(("writer", spawn_writer(Arc::clone(ctx), write_rx)?));
    threads.push(("supervisor", spawn_supervisor(Arc::clone(ctx))?));
    Ok(())
}

/// Join `handle` if it finishes before `deadline`. A thread still running at
/// the deadline is detached.
fn join_until(handle: JoinHandle<()>, deadline: Instant) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        tracing::error!("link thread panicked");
    }
    true
}
