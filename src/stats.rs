//! Per-connection traffic counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated by the connection task
#[derive(Debug, Default)]
pub struct ConnectionStats {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_filtered: AtomicU64,
    frames_lost: AtomicU64,
    links_established: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_in(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.frames_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self) {
        self.frames_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_link(&self) {
        self.links_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            frames_lost: self.frames_lost.load(Ordering::Relaxed),
            links_established: self.links_established.load(Ordering::Relaxed),
        }
    }
}

/// Connection statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Total bytes read from peers
    pub bytes_received: u64,
    /// Total bytes written to peers
    pub bytes_sent: u64,
    /// Frames decoded from peers
    pub frames_received: u64,
    /// Frames delivered to peers
    pub frames_sent: u64,
    /// Frames decoded but rejected by the endpoint's filter
    pub frames_filtered: u64,
    /// Frames taken off the sink queue whose write failed
    pub frames_lost: u64,
    /// Links established over the connection's lifetime
    pub links_established: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_counting() {
        let stats = ConnectionStats::new();

        stats.record_link();
        stats.record_received(1500);
        stats.record_frame_in();
        stats.record_frame_in();
        stats.record_filtered();
        stats.record_sent(700);
        stats.record_lost();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.links_established, 1);
        assert_eq!(snapshot.bytes_received, 1500);
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_filtered, 1);
        assert_eq!(snapshot.bytes_sent, 700);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.frames_lost, 1);
    }
}
