// src/io/serial/reader.rs
//
// Blocking reader thread for one link.
// Pulls bytes from the open port into the terminal buffer and reports read
// failures to the circuit breaker. Parks while the breaker is not closed and
// yields the descriptor whenever writes are pending.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer_store::Direction;
use crate::io::{LinkContext, TransportError};

// ============================================================================
// Types and Configuration
// ============================================================================

/// Largest single read.
const READ_CHUNK_SIZE: usize = 4096;

/// Notify the UI at most this often (~40 Hz).
const EMIT_INTERVAL: Duration = Duration::from_millis(25);

/// Idle poll while the port is suspended or a write is pending.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Upper bound for the pause after a failed read.
const MAX_FAILURE_PAUSE: Duration = Duration::from_millis(250);

// ============================================================================
// Serial Reader
// ============================================================================

pub(crate) fn spawn_reader(ctx: Arc<LinkContext>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("link-reader-{}", ctx.config.port_name))
        .spawn(move || run_reader_blocking(ctx))
}

fn run_reader_blocking(ctx: Arc<LinkContext>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let failure_pause = ctx.config.read_timeout().min(MAX_FAILURE_PAUSE);
    let mut last_emit_time = Instant::now();
    let mut dirty = false;

    tracing::debug!(session_id = %ctx.session_id, port = %ctx.config.port_name, "reader started");

    loop {
        if ctx.is_cancelled() {
            break;
        }

        // Emit batched updates periodically
        if dirty && last_emit_time.elapsed() >= EMIT_INTERVAL {
            ctx.shared.notify_buffer_updated();
            last_emit_time = Instant::now();
            dirty = false;
        }

        // Write-then-yield: the writer gets the descriptor first
        if ctx.pending_writes() > 0 {
            thread::sleep(IDLE_POLL);
            continue;
        }

        if ctx.shared.breaker().check().is_err() {
            ctx.sleep_unless_cancelled(IDLE_POLL);
            continue;
        }

        let read_result = {
            let mut slot = ctx.port();
            slot.as_mut().map(|port| port.read(&mut buf))
        };

        match read_result {
            None => {
                // Port closed by a trip; the supervisor will reopen it
                ctx.sleep_unless_cancelled(IDLE_POLL);
            }
            Some(Ok(n)) if n > 0 => {
                ctx.shared.buffer.append(Direction::Rx, buf[..n].to_vec());
                ctx.shared.buffer.stats().add_rx(n);
                ctx.shared.breaker().record_io_success();
                dirty = true;
            }
            Some(Ok(_)) => {
                // EOF - device went away under us
                ctx.report_failure(TransportError::EndOfStream);
                ctx.sleep_unless_cancelled(failure_pause);
            }
            Some(Err(ref e))
                if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) =>
            {
                // Timeout is expected for serial reads
            }
            Some(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Some(Err(e)) => {
                ctx.report_failure(TransportError::Read(e));
                ctx.sleep_unless_cancelled(failure_pause);
            }
        }
    }

    if dirty {
        ctx.shared.notify_buffer_updated();
    }
    tracing::debug!(session_id = %ctx.session_id, "reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{test_context, wait_until};
    use crate::io::{BreakerState, LinkStatus, LoopbackDevice};

    #[test]
    fn test_reader_appends_rx_records() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        let handle = spawn_reader(Arc::clone(&ctx)).unwrap();

        device.inject(b"hello");
        assert!(wait_until(|| ctx.shared.buffer.stats().snapshot().bytes_rx == 5));

        ctx.cancel();
        handle.join().unwrap();

        let snapshot = ctx.shared.buffer.snapshot(0, 10);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].direction, Direction::Rx);
        assert_eq!(snapshot.records[0].payload(), b"hello");
    }

    #[test]
    fn test_reader_holds_off_while_writes_pending() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        ctx.write_queued();
        let handle = spawn_reader(Arc::clone(&ctx)).unwrap();

        device.inject(b"data");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(ctx.shared.buffer.stats().snapshot().bytes_rx, 0);

        ctx.write_settled();
        assert!(wait_until(|| ctx.shared.buffer.stats().snapshot().bytes_rx == 4));
        ctx.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_repeated_read_failures_trip_the_breaker() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        let handle = spawn_reader(Arc::clone(&ctx)).unwrap();

        device.unplug();
        assert!(wait_until(|| matches!(
            ctx.shared.status(),
            LinkStatus::Reconnecting { attempt: 1, .. }
        )));
        assert!(ctx.port().is_none());
        assert_ne!(ctx.shared.breaker().state(), BreakerState::Closed);
        assert!(ctx.shared.buffer.stats().snapshot().error_count >= 3);

        ctx.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_trip_during_live_traffic_recovers_through_reopen() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        let reader = spawn_reader(Arc::clone(&ctx)).unwrap();
        let supervisor = crate::io::spawn_supervisor(Arc::clone(&ctx)).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let feeder = {
            let device = device.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    device.inject(b"tick");
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        for _ in 0..20 {
            assert!(wait_until(|| ctx.shared.status() == LinkStatus::Connected && ctx.port().is_some()));
            let opens = device.opens();
            ctx.report_device_missing();
            assert!(wait_until(|| {
                device.opens() > opens && ctx.shared.status() == LinkStatus::Connected
            }));
        }

        stop.store(true, Ordering::Release);
        feeder.join().unwrap();
        assert!(wait_until(|| ctx.port().is_some()));
        assert_eq!(ctx.shared.breaker().state(), BreakerState::Closed);
        assert!(ctx.shared.buffer.stats().snapshot().bytes_rx > 0);

        ctx.cancel();
        reader.join().unwrap();
        supervisor.join().unwrap();
    }
}
