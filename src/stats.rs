//! Read-only statistics surfaces for external consumers.
//!
//! Reporting, export, and presentation of these numbers happen outside the
//! core; this module only defines the snapshots and the server-side send
//! counters they are derived from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::net::QualityTier;

/// Point-in-time view of a player's network health and playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    /// Fraction of media packets estimated lost, in `[0, 1]`.
    pub loss_ratio: f64,
    /// Estimated receive bandwidth, bytes per second.
    pub bandwidth_bps: f64,
    /// Last control-channel round-trip, milliseconds.
    pub latency_ms: f64,
    /// Quality tier currently selected by the adaptive controller.
    pub tier: QualityTier,
    /// Inter-packet delay the controller recommends right now.
    pub recommended_delay: Duration,
    /// Assembled-frame queue occupancy, in `[0, 1]`.
    pub buffer_health: f64,
}

/// Cumulative send-path counters. O(1) memory; safe to share with the
/// media send thread, which only increments.
#[derive(Debug)]
pub struct SendMonitor {
    started: Instant,
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl SendMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Account one sent datagram.
    pub fn record(&self, bytes: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SendReport {
        let duration = self.started.elapsed();
        let packets = self.packets.load(Ordering::Relaxed);
        let bytes = self.bytes.load(Ordering::Relaxed);
        let secs = duration.as_secs_f64();
        SendReport {
            duration,
            total_packets: packets,
            total_bytes: bytes,
            packets_per_second: if secs > 0.0 { packets as f64 / secs } else { 0.0 },
            bandwidth_bps: if secs > 0.0 { bytes as f64 / secs } else { 0.0 },
        }
    }
}

impl Default for SendMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived send-path statistics since the monitor was created.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    pub duration: Duration,
    pub total_packets: u64,
    pub total_bytes: u64,
    pub packets_per_second: f64,
    /// Bytes per second averaged over the whole run.
    pub bandwidth_bps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_accumulates() {
        let m = SendMonitor::new();
        m.record(1000);
        m.record(400);
        let report = m.snapshot();
        assert_eq!(report.total_packets, 2);
        assert_eq!(report.total_bytes, 1400);
        assert!(report.bandwidth_bps > 0.0);
    }

    #[test]
    fn empty_monitor_reports_zero() {
        let report = SendMonitor::new().snapshot();
        assert_eq!(report.total_packets, 0);
        assert_eq!(report.total_bytes, 0);
    }
}
