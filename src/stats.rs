//! Transmit and receive counters
//!
//! Counters are plain atomics so the worker threads never contend on a lock
//! to update them; readers take a [`StatisticsSnapshot`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Output pipeline counters, written by the frame scheduler thread
#[derive(Debug, Default)]
pub struct Statistics {
    total_frames: AtomicU64,
    dropped_frames: AtomicU64,
    late_ticks: AtomicU64,
    queue_depth: AtomicUsize,
    last_frame_time_us: AtomicU64,
}

/// Point-in-time copy of [`Statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Frames successfully transmitted
    pub total_frames: u64,
    /// Frames discarded by the drop-oldest queue policy
    pub dropped_frames: u64,
    /// Deadlines skipped because a tick overran by a full interval
    pub late_ticks: u64,
    /// Frames waiting in the queue after the last tick
    pub queue_depth: usize,
    /// Wall-clock duration of the last tick's work
    pub last_frame_time: Duration,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.total_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_ticks(&self, count: u64) {
        self.late_ticks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_last_frame_time(&self, elapsed: Duration) {
        self.last_frame_time_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            late_ticks: self.late_ticks.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            last_frame_time: Duration::from_micros(self.last_frame_time_us.load(Ordering::Relaxed)),
        }
    }
}

/// Receive path counters, written by the receive thread
#[derive(Debug, Default)]
pub struct ReceiverStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    invalid_packets: AtomicU64,
    dmx_delivered: AtomicU64,
    dmx_filtered: AtomicU64,
    polls_answered: AtomicU64,
    replies_received: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStatsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
    pub dmx_delivered: u64,
    pub dmx_filtered: u64,
    pub polls_answered: u64,
    pub replies_received: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self, len: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.dmx_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.dmx_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_answered(&self) {
        self.polls_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply(&self) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            dmx_delivered: self.dmx_delivered.load(Ordering::Relaxed),
            dmx_filtered: self.dmx_filtered.load(Ordering::Relaxed),
            polls_answered: self.polls_answered.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
        }
    }
}
