//! Observability and Metrics
//!
//! Per-connection counters for frame traffic and background-task health.
//!
//! Uses atomic counters so the send path, the receive loop and the ping loop
//! can record events without coordinating.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one connection
#[derive(Debug)]
pub struct Metrics {
    /// Total frames written
    pub frames_sent: AtomicU64,
    /// Total frames read
    pub frames_received: AtomicU64,
    /// Total bytes written (headers included)
    pub bytes_sent: AtomicU64,
    /// Total bytes read (headers included)
    pub bytes_received: AtomicU64,
    /// Inbound frames whose payload failed to decode
    pub decode_errors: AtomicU64,
    /// Inbound frames with no pending request for their sequence number
    pub unmatched_responses: AtomicU64,
    /// Sends rejected because their sequence number was still pending
    pub duplicate_sequences: AtomicU64,
    /// Keepalive pings answered
    pub pings_sent: AtomicU64,
    /// Keepalive pings that failed or went unanswered
    pub pings_failed: AtomicU64,
    /// Pending requests cancelled by shutdown
    pub requests_cancelled: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unmatched_responses: AtomicU64::new(0),
            duplicate_sequences: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            pings_failed: AtomicU64::new(0),
            requests_cancelled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a frame written to the socket
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a frame read from the socket
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unmatched_response(&self) {
        self.unmatched_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_sequence(&self) {
        self.duplicate_sequences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_failed(&self) {
        self.pings_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` requests cancelled in one shutdown
    pub fn requests_cancelled(&self, count: u64) {
        self.requests_cancelled.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unmatched_responses: self.unmatched_responses.load(Ordering::Relaxed),
            duplicate_sequences: self.duplicate_sequences.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            pings_failed: self.pings_failed.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            decode_errors = snapshot.decode_errors,
            unmatched_responses = snapshot.unmatched_responses,
            duplicate_sequences = snapshot.duplicate_sequences,
            pings_sent = snapshot.pings_sent,
            pings_failed = snapshot.pings_failed,
            requests_cancelled = snapshot.requests_cancelled,
            uptime_seconds = snapshot.uptime_seconds,
            "Connection metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub decode_errors: u64,
    pub unmatched_responses: u64,
    pub duplicate_sequences: u64,
    pub pings_sent: u64,
    pub pings_failed: u64,
    pub requests_cancelled: u64,
    pub uptime_seconds: u64,
}
