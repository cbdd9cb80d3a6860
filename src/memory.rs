// src/memory.rs
//
// Background memory optimizer for the terminal buffer.
//
// Runs on its own thread, waking on a fixed interval or when an append
// pushes the buffer past the high-water mark. A sweep drops cached
// renderings outside the visible window and, when early eviction is
// allowed, trims the buffer down to the low-water mark.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer_store::TerminalBuffer;

fn default_sweep_interval_ms() -> u64 {
    5_000
}
fn default_high_water_ratio() -> f64 {
    0.8
}
fn default_low_water_ratio() -> f64 {
    0.6
}
fn default_visible_window() -> usize {
    500
}
fn default_early_eviction() -> bool {
    true
}
fn default_render_cache_limit() -> usize {
    4 * 1024 * 1024
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Fraction of either cap that counts as pressure.
    #[serde(default = "default_high_water_ratio")]
    pub high_water_ratio: f64,
    /// Fraction of the caps an early eviction trims down to.
    #[serde(default = "default_low_water_ratio")]
    pub low_water_ratio: f64,
    /// Newest records whose renderings are always kept.
    #[serde(default = "default_visible_window")]
    pub visible_window: usize,
    /// Allow evicting records before the hard caps are reached.
    #[serde(default = "default_early_eviction")]
    pub early_eviction: bool,
    /// Rendered-text bytes above which caches are dropped regardless of buffer size.
    #[serde(default = "default_render_cache_limit")]
    pub render_cache_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            high_water_ratio: default_high_water_ratio(),
            low_water_ratio: default_low_water_ratio(),
            visible_window: default_visible_window(),
            early_eviction: default_early_eviction(),
            render_cache_limit: default_render_cache_limit(),
        }
    }
}

impl OptimizerConfig {
    fn scaled(value: usize, ratio: f64) -> usize {
        (value as f64 * ratio.clamp(0.0, 1.0)) as usize
    }

    /// (records, bytes) above which the buffer is under pressure.
    pub fn high_water(&self, buffer: &TerminalBuffer) -> (usize, usize) {
        let caps = buffer.caps();
        (
            Self::scaled(caps.max_records, self.high_water_ratio),
            Self::scaled(caps.max_bytes, self.high_water_ratio),
        )
    }

    /// (records, bytes) an early eviction trims down to.
    pub fn low_water(&self, buffer: &TerminalBuffer) -> (usize, usize) {
        let caps = buffer.caps();
        (
            Self::scaled(caps.max_records, self.low_water_ratio),
            Self::scaled(caps.max_bytes, self.low_water_ratio),
        )
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_trimmed: usize,
    pub bytes_trimmed: usize,
    pub caches_dropped: usize,
}

pub struct MemoryOptimizer {
    buffer: Arc<TerminalBuffer>,
    config: OptimizerConfig,
    stop: Arc<AtomicBool>,
    wake: Option<mpsc::SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryOptimizer {
    pub fn new(buffer: Arc<TerminalBuffer>, config: OptimizerConfig) -> Self {
        Self {
            buffer,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            wake: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Run one sweep on the calling thread.
    pub fn sweep(&self) -> SweepReport {
        sweep(&self.buffer, &self.config)
    }

    /// Start the background thread. No-op if already running.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let (wake_tx, wake_rx) = mpsc::sync_channel::<()>(1);
        let (high_records, high_bytes) = self.config.high_water(&self.buffer);
        self.buffer
            .set_pressure_hook(Some((high_records, high_bytes, wake_tx.clone())));

        self.stop.store(false, Ordering::Release);
        let buffer = Arc::clone(&self.buffer);
        let config = self.config.clone();
        let stop = Arc::clone(&self.stop);
        let interval = Duration::from_millis(self.config.sweep_interval_ms.max(1));

        let spawned = thread::Builder::new()
            .name("memory-optimizer".into())
            .spawn(move || {
                tracing::debug!("memory optimizer started");
                loop {
                    match wake_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    let report = sweep(&buffer, &config);
                    if report != SweepReport::default() {
                        tracing::debug!(
                            records_trimmed = report.records_trimmed,
                            bytes_trimmed = report.bytes_trimmed,
                            caches_dropped = report.caches_dropped,
                            "memory sweep"
                        );
                    }
                }
                tracing::debug!("memory optimizer stopped");
            });

        match spawned {
            Ok(handle) => {
                self.wake = Some(wake_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.buffer.set_pressure_hook(None);
                Err(e)
            }
        }
    }

    /// Stop the background thread and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.buffer.set_pressure_hook(None);
        if let Some(wake) = self.wake.take() {
            let _ = wake.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("memory optimizer thread panicked");
            }
        }
    }
}

impl Drop for MemoryOptimizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep(buffer: &TerminalBuffer, config: &OptimizerConfig) -> SweepReport {
    let mut report = SweepReport::default();
    let (high_records, high_bytes) = config.high_water(buffer);
    let under_pressure = buffer.len() > high_records || buffer.total_bytes() > high_bytes;

    if under_pressure && config.early_eviction {
        let (low_records, low_bytes) = config.low_water(buffer);
        let trimmed = buffer.trim_to(low_records, low_bytes);
        report.records_trimmed = trimmed.records;
        report.bytes_trimmed = trimmed.bytes;
    }

    if under_pressure || buffer.rendered_bytes() > config.render_cache_limit {
        report.caches_dropped = buffer.drop_rendered_outside(config.visible_window);
    }
    report
}
