// src/io/serial/writer.rs
//
// Bounded FIFO write queue and the thread that drains it.
//
// `enqueue` never blocks: a full queue is reported to the caller. The writer
// thread delivers entries in order, holding the head entry while the circuit
// breaker is not closed. Entries still queued at shutdown are discarded.

use std::sync::mpsc::{self as std_mpsc, Receiver, RecvTimeoutError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer_store::Direction;
use crate::io::{LinkContext, SendError, TransportError, WriteRequest, WriteSender};

/// Largest payload accepted by `send`.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// How long the writer waits for work before rechecking cancellation.
const RECV_POLL: Duration = Duration::from_millis(20);

/// Poll interval while holding an entry for a suspended port.
const HOLD_POLL: Duration = Duration::from_millis(10);

// ============================================================================
// Queue
// ============================================================================

/// Producer side of the write queue.
pub(crate) struct WriteQueue {
    tx: WriteSender,
    capacity: usize,
    ctx: Arc<LinkContext>,
}

impl WriteQueue {
    pub fn channel(ctx: Arc<LinkContext>, capacity: usize) -> (Self, Receiver<WriteRequest>) {
        let capacity = capacity.max(1);
        let (tx, rx) = std_mpsc::sync_channel::<WriteRequest>(capacity);
        (Self { tx, capacity, ctx }, rx)
    }

    /// Queue `data` for delivery. Fails fast when the queue is full.
    pub fn enqueue(&self, data: Vec<u8>) -> Result<(), SendError> {
        self.ctx.write_queued();
        let request = WriteRequest {
            data,
            queued_at: Instant::now(),
        };
        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.ctx.write_settled();
                Err(SendError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                self.ctx.write_settled();
                Err(SendError::NotConnected)
            }
        }
    }
}

// ============================================================================
// Writer thread
// ============================================================================

pub(crate) fn spawn_writer(
    ctx: Arc<LinkContext>,
    rx: Receiver<WriteRequest>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("link-writer-{}", ctx.config.port_name))
        .spawn(move || run_writer_blocking(ctx, rx))
}

fn run_writer_blocking(ctx: Arc<LinkContext>, rx: Receiver<WriteRequest>) {
    tracing::debug!(session_id = %ctx.session_id, "writer started");

    let mut discarded = 0usize;
    loop {
        if ctx.is_cancelled() {
            break;
        }
        match rx.recv_timeout(RECV_POLL) {
            Ok(request) => {
                if !deliver(&ctx, request) {
                    ctx.write_settled();
                    discarded += 1;
                    break;
                }
                // Let the reader back in between writes
                thread::yield_now();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    while rx.try_recv().is_ok() {
        ctx.write_settled();
        discarded += 1;
    }
    if discarded > 0 {
        tracing::info!(session_id = %ctx.session_id, discarded, "pending writes discarded");
        ctx.shared
            .record_info(format!("{} queued write(s) discarded on disconnect", discarded));
    }
    tracing::debug!(session_id = %ctx.session_id, "writer stopped");
}

/// Write one entry. Returns `false` if cancelled while holding it.
fn deliver(ctx: &LinkContext, request: WriteRequest) -> bool {
    loop {
        if ctx.is_cancelled() {
            return false;
        }
        if ctx.shared.breaker().check().is_err() {
            ctx.sleep_unless_cancelled(HOLD_POLL);
            continue;
        }

        let result = {
            let mut slot = ctx.port();
            slot.as_mut().map(|port| port.write_chunked(&request.data))
        };

        match result {
            None => ctx.sleep_unless_cancelled(HOLD_POLL),
            Some(Ok(())) => {
                let len = request.data.len();
                ctx.shared.buffer.stats().add_tx(len);
                ctx.shared.buffer.append(Direction::Tx, request.data);
                ctx.shared.breaker().record_io_success();
                // Settle after the TX record so an echo cannot be recorded first
                ctx.write_settled();
                ctx.shared.notify_buffer_updated();
                tracing::trace!(
                    bytes = len,
                    queued_us = request.queued_at.elapsed().as_micros() as u64,
                    "write delivered"
                );
                return true;
            }
            Some(Err(e)) => {
                ctx.write_settled();
                ctx.report_failure(TransportError::Write(e));
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{test_context, wait_until};
    use crate::io::LoopbackDevice;

    #[test]
    fn test_writes_are_delivered_in_order() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        let (queue, rx) = WriteQueue::channel(Arc::clone(&ctx), 8);
        let handle = spawn_writer(Arc::clone(&ctx), rx).unwrap();

        queue.enqueue(b"one,".to_vec()).unwrap();
        queue.enqueue(b"two,".to_vec()).unwrap();
        queue.enqueue(b"three".to_vec()).unwrap();
        assert!(wait_until(|| device.written() == b"one,two,three"));
        assert!(wait_until(|| ctx.pending_writes() == 0));

        ctx.cancel();
        handle.join().unwrap();

        let tx: Vec<Vec<u8>> = ctx
            .shared
            .buffer
            .snapshot(0, 10)
            .iter()
            .filter(|r| r.direction == Direction::Tx)
            .map(|r| r.payload().to_vec())
            .collect();
        assert_eq!(tx, vec![b"one,".to_vec(), b"two,".to_vec(), b"three".to_vec()]);
        assert_eq!(ctx.shared.buffer.stats().snapshot().bytes_tx, 13);
    }

    #[test]
    fn test_full_queue_is_reported() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        // No writer thread: nothing drains the queue
        let (queue, _rx) = WriteQueue::channel(Arc::clone(&ctx), 2);
        queue.enqueue(vec![1]).unwrap();
        queue.enqueue(vec![2]).unwrap();
        assert_eq!(queue.enqueue(vec![3]), Err(SendError::QueueFull { capacity: 2 }));
        assert_eq!(ctx.pending_writes(), 2);
    }

    #[test]
    fn test_write_failure_is_recorded() {
        let device = LoopbackDevice::new("loop0");
        device.fail_next_writes(1);
        let ctx = test_context(&device);
        let (queue, rx) = WriteQueue::channel(Arc::clone(&ctx), 8);
        let handle = spawn_writer(Arc::clone(&ctx), rx).unwrap();

        queue.enqueue(b"lost".to_vec()).unwrap();
        queue.enqueue(b"kept".to_vec()).unwrap();
        assert!(wait_until(|| device.written() == b"kept"));

        ctx.cancel();
        handle.join().unwrap();
        let stats = ctx.shared.buffer.stats().snapshot();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.bytes_tx, 4);
    }

    #[test]
    fn test_pending_writes_discarded_on_cancel() {
        let device = LoopbackDevice::new("loop0");
        let ctx = test_context(&device);
        let (queue, rx) = WriteQueue::channel(Arc::clone(&ctx), 8);
        queue.enqueue(b"a".to_vec()).unwrap();
        queue.enqueue(b"b".to_vec()).unwrap();
        ctx.cancel();
        let handle = spawn_writer(Arc::clone(&ctx), rx).unwrap();
        handle.join().unwrap();

        assert!(device.written().is_empty());
        assert_eq!(ctx.pending_writes(), 0);
        let info = ctx.shared.buffer.tail(1);
        assert_eq!(info.records[0].text(), "2 queued write(s) discarded on disconnect");
    }
}
