// src/buffer_store.rs
//
// Bounded in-memory record store for one terminal view.
//
// Every TX/RX/Error/Info event becomes an immutable `BufferRecord` with a
// monotonically increasing sequence number. The store evicts oldest-first to
// stay within its record and byte caps, and hands readers snapshots that are
// unaffected by concurrent appends. Session counters live alongside the
// records so `clear` can reset both together.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::render::{render_record, DisplayOptions};

// ============================================================================
// Types
// ============================================================================

/// Origin of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Tx,
    Rx,
    Error,
    Info,
}

fn default_max_records() -> usize {
    10_000
}

fn default_max_bytes() -> usize {
    1024 * 1024
}

/// Hard limits for the terminal buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCaps {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Sum of payload sizes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for BufferCaps {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// One immutable entry in the terminal buffer.
///
/// The rendered text is a cache: it can be dropped at any time and is
/// recomputed from the payload on demand.
#[derive(Debug)]
pub struct BufferRecord {
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    payload: Vec<u8>,
    rendered: Mutex<Option<(u64, Arc<str>)>>,
}

impl BufferRecord {
    pub(crate) fn new(seq: u64, direction: Direction, payload: Vec<u8>) -> Self {
        Self {
            seq,
            timestamp: Local::now(),
            direction,
            payload,
            rendered: Mutex::new(None),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as lossy UTF-8, without rendering.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    fn cache(&self) -> MutexGuard<'_, Option<(u64, Arc<str>)>> {
        self.rendered.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rendered_with(&self, options: &DisplayOptions, generation: u64) -> Arc<str> {
        let mut cache = self.cache();
        if let Some((cached_generation, text)) = cache.as_ref() {
            if *cached_generation == generation {
                return Arc::clone(text);
            }
        }
        let text: Arc<str> = Arc::from(render_record(self, options));
        *cache = Some((generation, Arc::clone(&text)));
        text
    }

    fn cached_len(&self) -> usize {
        self.cache().as_ref().map_or(0, |(_, text)| text.len())
    }

    fn drop_cache(&self) -> bool {
        self.cache().take().is_some()
    }

    pub fn has_cached_render(&self) -> bool {
        self.cache().is_some()
    }
}

/// Ordered, read-only view returned by `snapshot` and `tail`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Arc<BufferRecord>>,
    /// Cursor for the next incremental read.
    pub next_seq: u64,
    /// Records between the requested start and the oldest retained record.
    /// They were dropped by eviction, `trim_to` or `clear` before they could
    /// be read.
    pub skipped: u64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BufferRecord>> {
        self.records.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = Arc<BufferRecord>;
    type IntoIter = std::vec::IntoIter<Arc<BufferRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Result of an explicit trim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub records: usize,
    pub bytes: usize,
}

// ============================================================================
// Session statistics
// ============================================================================

/// Read-only session counters for the UI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub connected_since: Option<DateTime<Local>>,
    pub error_count: u64,
    pub records_evicted: u64,
    /// Cumulative connected time; survives `clear`.
    pub session_duration: Duration,
}

#[derive(Default)]
struct SessionClock {
    connected_since: Option<DateTime<Local>>,
    connected_at: Option<Instant>,
    accumulated: Duration,
}

/// Counters updated by the I/O threads.
#[derive(Default)]
pub struct SessionCounters {
    bytes_tx: AtomicU64,
    bytes_rx: AtomicU64,
    error_count: AtomicU64,
    records_evicted: AtomicU64,
    clock: Mutex<SessionClock>,
}

impl SessionCounters {
    pub fn add_tx(&self, n: usize) {
        self.bytes_tx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_rx(&self, n: usize) {
        self.bytes_rx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn add_evicted(&self, n: usize) {
        if n > 0 {
            self.records_evicted.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    fn clock(&self) -> MutexGuard<'_, SessionClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset_counters(&self) {
        self.bytes_tx.store(0, Ordering::Relaxed);
        self.bytes_rx.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.records_evicted.store(0, Ordering::Relaxed);
    }

    /// Zero everything for a new connection and start the clock.
    pub fn start_session(&self) {
        self.reset_counters();
        let mut clock = self.clock();
        clock.accumulated = Duration::ZERO;
        clock.connected_since = Some(Local::now());
        clock.connected_at = Some(Instant::now());
    }

    /// Stop the clock, folding elapsed time into the cumulative duration.
    pub fn end_session(&self) {
        let mut clock = self.clock();
        if let Some(started) = clock.connected_at.take() {
            clock.accumulated += started.elapsed();
        }
    }

    pub fn snapshot(&self) -> SessionStats {
        let clock = self.clock();
        let running = clock.connected_at.map(|t| t.elapsed()).unwrap_or_default();
        SessionStats {
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            connected_since: clock.connected_since,
            error_count: self.error_count.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            session_duration: clock.accumulated + running,
        }
    }
}

// ============================================================================
// Terminal buffer
// ============================================================================

struct BufferInner {
    records: VecDeque<Arc<BufferRecord>>,
    total_bytes: usize,
    next_seq: u64,
}

impl BufferInner {
    fn first_seq(&self) -> u64 {
        self.records.front().map_or(self.next_seq, |r| r.seq)
    }

    fn evict_until(&mut self, max_records: usize, max_bytes: usize) -> TrimReport {
        let mut report = TrimReport::default();
        while self.records.len() > max_records || self.total_bytes > max_bytes {
            match self.records.pop_front() {
                Some(record) => {
                    self.total_bytes -= record.len();
                    report.records += 1;
                    report.bytes += record.len();
                }
                None => break,
            }
        }
        report
    }
}

/// Thresholds above which appends wake the memory optimizer.
struct PressureHook {
    records: usize,
    bytes: usize,
    wake: SyncSender<()>,
}

struct DisplayState {
    options: DisplayOptions,
    generation: u64,
}

/// Bounded, ordered record store shared by the I/O threads and the UI.
pub struct TerminalBuffer {
    caps: BufferCaps,
    inner: RwLock<BufferInner>,
    stats: SessionCounters,
    display: RwLock<DisplayState>,
    pressure: Mutex<Option<PressureHook>>,
}

impl TerminalBuffer {
    pub fn new(caps: BufferCaps) -> Self {
        Self {
            caps,
            inner: RwLock::new(BufferInner {
                records: VecDeque::new(),
                total_bytes: 0,
                next_seq: 0,
            }),
            stats: SessionCounters::default(),
            display: RwLock::new(DisplayState {
                options: DisplayOptions::default(),
                generation: 0,
            }),
            pressure: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn caps(&self) -> &BufferCaps {
        &self.caps
    }

    pub fn stats(&self) -> &SessionCounters {
        &self.stats
    }

    /// Append a record, evicting oldest records to stay within the caps.
    ///
    /// A payload larger than `max_bytes` keeps only its newest bytes.
    pub fn append(&self, direction: Direction, mut payload: Vec<u8>) -> Arc<BufferRecord> {
        if payload.len() > self.caps.max_bytes {
            let excess = payload.len() - self.caps.max_bytes;
            payload.drain(..excess);
        }

        let (record, evicted, over_pressure) = {
            let mut inner = self.write();
            let record = Arc::new(BufferRecord::new(inner.next_seq, direction, payload));
            inner.next_seq += 1;
            inner.total_bytes += record.len();
            inner.records.push_back(Arc::clone(&record));
            let evicted = inner.evict_until(self.caps.max_records, self.caps.max_bytes);
            let over = self.above_pressure(inner.records.len(), inner.total_bytes);
            (record, evicted, over)
        };

        self.stats.add_evicted(evicted.records);
        if over_pressure {
            self.nudge_optimizer();
        }
        record
    }

    /// Convenience for Info/Error records.
    pub fn append_message(&self, direction: Direction, message: impl Into<String>) -> Arc<BufferRecord> {
        self.append(direction, message.into().into_bytes())
    }

    /// Up to `count` records with `seq >= from_seq`, oldest first.
    ///
    /// Pass `next_seq` from the previous snapshot to read incrementally.
    pub fn snapshot(&self, from_seq: u64, count: usize) -> Snapshot {
        let inner = self.read();
        let first = inner.first_seq();
        let start = from_seq.max(first);
        let skipped = start.saturating_sub(from_seq);
        let offset = usize::try_from(start - first).unwrap_or(usize::MAX);
        let records: Vec<_> = inner
            .records
            .iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect();
        let next_seq = records.last().map_or(start.min(inner.next_seq), |r| r.seq + 1);
        Snapshot {
            records,
            next_seq,
            skipped,
        }
    }

    /// The newest `count` records.
    pub fn tail(&self, count: usize) -> Snapshot {
        let inner = self.read();
        let skip = inner.records.len().saturating_sub(count);
        let records: Vec<_> = inner.records.iter().skip(skip).cloned().collect();
        Snapshot {
            records,
            next_seq: inner.next_seq,
            skipped: 0,
        }
    }

    /// Drop all records and reset the counters. Sequence numbers keep
    /// increasing so existing cursors stay valid; cumulative duration is kept.
    pub fn clear(&self) {
        {
            let mut inner = self.write();
            inner.records.clear();
            inner.total_bytes = 0;
        }
        self.stats.reset_counters();
    }

    /// Evict oldest records until within the given limits.
    pub fn trim_to(&self, max_records: usize, max_bytes: usize) -> TrimReport {
        let report = self.write().evict_until(max_records, max_bytes);
        self.stats.add_evicted(report.records);
        report
    }

    /// Drop cached renderings for all but the newest `window` records.
    /// Returns how many caches were dropped.
    pub fn drop_rendered_outside(&self, window: usize) -> usize {
        let inner = self.read();
        let keep_from = inner.records.len().saturating_sub(window);
        inner
            .records
            .iter()
            .take(keep_from)
            .filter(|record| record.drop_cache())
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.read().total_bytes
    }

    /// Sequence number the next record will get.
    pub fn next_seq(&self) -> u64 {
        self.read().next_seq
    }

    /// Bytes held by cached renderings.
    pub fn rendered_bytes(&self) -> usize {
        self.read().records.iter().map(|r| r.cached_len()).sum()
    }

    // ------------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------------

    pub fn display_options(&self) -> DisplayOptions {
        self.display.read().unwrap_or_else(|e| e.into_inner()).options
    }

    /// Change view settings; cached renderings become stale.
    pub fn set_display_options(&self, options: DisplayOptions) {
        let mut display = self.display.write().unwrap_or_else(|e| e.into_inner());
        if display.options != options {
            display.options = options;
            display.generation += 1;
        }
    }

    /// Rendered text for a record under the current display options.
    pub fn rendered_text(&self, record: &BufferRecord) -> Arc<str> {
        let (options, generation) = {
            let display = self.display.read().unwrap_or_else(|e| e.into_inner());
            (display.options, display.generation)
        };
        record.rendered_with(&options, generation)
    }

    // ------------------------------------------------------------------------
    // Memory pressure
    // ------------------------------------------------------------------------

    /// Register a channel poked when an append leaves the buffer above the
    /// given thresholds. `None` unregisters.
    pub fn set_pressure_hook(&self, thresholds: Option<(usize, usize, SyncSender<()>)>) {
        let mut hook = self.pressure.lock().unwrap_or_else(|e| e.into_inner());
        *hook = thresholds.map(|(records, bytes, wake)| PressureHook { records, bytes, wake });
    }

    fn above_pressure(&self, records: usize, bytes: usize) -> bool {
        let hook = self.pressure.lock().unwrap_or_else(|e| e.into_inner());
        hook.as_ref()
            .map_or(false, |h| records > h.records || bytes > h.bytes)
    }

    fn nudge_optimizer(&self) {
        let hook = self.pressure.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(h) = hook.as_ref() {
            // A wake-up already pending is as good as a new one
            let _ = h.wake.try_send(());
        }
    }
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::new(BufferCaps::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DisplayMode;
    use std::sync::mpsc;
    use std::thread;

    fn small(max_records: usize, max_bytes: usize) -> TerminalBuffer {
        TerminalBuffer::new(BufferCaps { max_records, max_bytes })
    }

    // ------------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------------

    #[test]
    fn test_appending_past_record_cap_evicts_oldest() {
        let buffer = small(5, 1024);
        for i in 0..8u8 {
            buffer.append(Direction::Rx, vec![i]);
        }
        assert_eq!(buffer.len(), 5);
        let snapshot = buffer.snapshot(0, 100);
        let seqs: Vec<u64> = snapshot.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5, 6, 7]);
        assert_eq!(snapshot.skipped, 3);
        assert_eq!(buffer.stats().snapshot().records_evicted, 3);
    }

    #[test]
    fn test_byte_cap_evicts_oldest() {
        let buffer = small(100, 10);
        buffer.append(Direction::Rx, vec![0; 4]);
        buffer.append(Direction::Rx, vec![1; 4]);
        buffer.append(Direction::Rx, vec![2; 4]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 8);
        assert_eq!(buffer.snapshot(0, 10).records[0].payload(), &[1; 4]);
    }

    #[test]
    fn test_oversize_record_keeps_newest_bytes() {
        let buffer = small(100, 4);
        buffer.append(Direction::Rx, b"abc".to_vec());
        let record = buffer.append(Direction::Rx, b"0123456789".to_vec());
        assert_eq!(record.payload(), b"6789");
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_bytes(), 4);
    }

    #[test]
    fn test_concurrent_appends_never_exceed_caps() {
        let buffer = Arc::new(small(1_000, 64 * 1024));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..2_000usize {
                        buffer.append(Direction::Rx, vec![t as u8; 16 + (i % 48)]);
                    }
                })
            })
            .collect();
        for _ in 0..200 {
            assert!(buffer.total_bytes() <= 64 * 1024);
            assert!(buffer.len() <= 1_000);
        }
        for w in writers {
            w.join().unwrap();
        }
        assert!(buffer.total_bytes() <= 64 * 1024);
        assert_eq!(buffer.next_seq(), 8_000);
    }

    #[test]
    fn test_sustained_input_stays_under_one_mebibyte() {
        let buffer = Arc::new(TerminalBuffer::default());
        let producer = {
            let buffer = Arc::clone(&buffer);
            // 10 MiB in 4 KiB reads
            thread::spawn(move || {
                for i in 0..2_560u32 {
                    buffer.append(Direction::Rx, vec![(i % 256) as u8; 4096]);
                }
            })
        };

        let mut cursor = 0;
        while !producer.is_finished() {
            let snapshot = buffer.snapshot(cursor, 64);
            let seqs: Vec<u64> = snapshot.iter().map(|r| r.seq).collect();
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            assert!(buffer.total_bytes() <= 1024 * 1024);
            cursor = snapshot.next_seq;
        }
        producer.join().unwrap();

        assert_eq!(buffer.total_bytes(), 1024 * 1024);
        assert_eq!(buffer.len(), 256);
        assert_eq!(buffer.stats().snapshot().records_evicted, 2_304);
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    #[test]
    fn test_snapshot_is_restartable() {
        let buffer = small(100, 1024);
        for i in 0..10u8 {
            buffer.append(Direction::Rx, vec![i]);
        }
        let first = buffer.snapshot(0, 4);
        assert_eq!(first.len(), 4);
        assert_eq!(first.next_seq, 4);

        buffer.append(Direction::Tx, vec![99]);
        let second = buffer.snapshot(first.next_seq, 100);
        let seqs: Vec<u64> = second.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (4..11).collect::<Vec<_>>());
        assert_eq!(second.next_seq, 11);

        let empty = buffer.snapshot(second.next_seq, 100);
        assert!(empty.is_empty());
        assert_eq!(empty.next_seq, 11);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_appends() {
        let buffer = small(3, 1024);
        buffer.append(Direction::Rx, b"a".to_vec());
        let snapshot = buffer.snapshot(0, 10);
        for _ in 0..5 {
            buffer.append(Direction::Rx, b"b".to_vec());
        }
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].payload(), b"a");
    }

    #[test]
    fn test_tail_returns_newest() {
        let buffer = small(100, 1024);
        for i in 0..6u8 {
            buffer.append(Direction::Rx, vec![i]);
        }
        let tail = buffer.tail(2);
        assert_eq!(tail.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(tail.next_seq, 6);
    }

    // ------------------------------------------------------------------------
    // Clear and stats
    // ------------------------------------------------------------------------

    #[test]
    fn test_clear_resets_counters_but_keeps_duration_and_seq() {
        let buffer = small(100, 1024);
        buffer.stats().start_session();
        buffer.append(Direction::Rx, b"hello".to_vec());
        buffer.stats().add_rx(5);
        buffer.stats().add_tx(3);
        buffer.stats().add_error();
        thread::sleep(Duration::from_millis(5));
        buffer.stats().end_session();
        let before = buffer.stats().snapshot().session_duration;

        buffer.clear();
        let stats = buffer.stats().snapshot();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
        assert_eq!(stats.bytes_rx, 0);
        assert_eq!(stats.bytes_tx, 0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.session_duration, before);
        assert!(before >= Duration::from_millis(5));

        let record = buffer.append(Direction::Rx, b"x".to_vec());
        assert_eq!(record.seq, 1);
    }

    #[test]
    fn test_snapshot_reports_records_lost_to_clear() {
        let buffer = small(100, 1024);
        for i in 0..5u8 {
            buffer.append(Direction::Rx, vec![i]);
        }
        buffer.clear();
        buffer.append(Direction::Rx, b"a".to_vec());
        buffer.append(Direction::Rx, b"b".to_vec());

        let snapshot = buffer.snapshot(0, 10);
        let seqs: Vec<u64> = snapshot.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![5, 6]);
        assert_eq!(snapshot.skipped, 5);
        assert_eq!(snapshot.next_seq, 7);

        // A cursor past the end reads nothing and skips nothing
        let snapshot = buffer.snapshot(u64::MAX, 10);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.skipped, 0);
        assert_eq!(snapshot.next_seq, 7);
    }

    #[test]
    fn test_start_session_zeroes_everything() {
        let buffer = small(100, 1024);
        buffer.stats().add_rx(10);
        buffer.stats().start_session();
        let stats = buffer.stats().snapshot();
        assert_eq!(stats.bytes_rx, 0);
        assert!(stats.connected_since.is_some());
    }

    // ------------------------------------------------------------------------
    // Rendering cache
    // ------------------------------------------------------------------------

    #[test]
    fn test_rendered_text_cache_follows_display_options() {
        let buffer = small(100, 1024);
        let record = buffer.append(Direction::Rx, b"OK".to_vec());
        assert_eq!(&*buffer.rendered_text(&record), "OK");
        assert_eq!(buffer.rendered_bytes(), 2);

        buffer.set_display_options(DisplayOptions {
            mode: DisplayMode::Hex,
            timestamps: false,
        });
        assert_eq!(&*buffer.rendered_text(&record), "4F 4B");
    }

    #[test]
    fn test_drop_rendered_outside_window() {
        let buffer = small(100, 1024);
        let records: Vec<_> = (0..5u8).map(|i| buffer.append(Direction::Rx, vec![b'a' + i])).collect();
        for record in &records {
            buffer.rendered_text(record);
        }
        assert_eq!(buffer.drop_rendered_outside(2), 3);
        assert!(!records[0].has_cached_render());
        assert!(records[4].has_cached_render());
        // Dropped caches are recomputed on demand
        assert_eq!(&*buffer.rendered_text(&records[0]), "a");
    }

    #[test]
    fn test_pressure_hook_wakes_on_append() {
        let buffer = small(100, 1024);
        let (tx, rx) = mpsc::sync_channel(1);
        buffer.set_pressure_hook(Some((2, 1024, tx)));
        buffer.append(Direction::Rx, vec![1]);
        buffer.append(Direction::Rx, vec![2]);
        assert!(rx.try_recv().is_err());
        buffer.append(Direction::Rx, vec![3]);
        assert!(rx.try_recv().is_ok());
    }
}
