// src/io/types.rs
//
// Shared types for the link threads and the UI notification channel.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::mpsc as std_mpsc;
use std::time::Instant;

// ============================================================================
// Status and events
// ============================================================================

/// Connection status as seen by the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    /// The breaker tripped. `attempt` counts trips since the link last worked.
    Reconnecting {
        attempt: u32,
        next_attempt_at: DateTime<Local>,
    },
    Disconnected,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected)
    }
}

/// Notifications for UI subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LinkEvent {
    /// New records are available up to and including `last_seq`.
    BufferUpdated { last_seq: u64 },
    StatusChanged(LinkStatus),
    BufferCleared,
}

// ============================================================================
// Write queue
// ============================================================================

/// One queued send.
pub struct WriteRequest {
    pub data: Vec<u8>,
    pub queued_at: Instant,
}

/// Sender side of the write queue (sync-safe)
pub type WriteSender = std_mpsc::SyncSender<WriteRequest>;
