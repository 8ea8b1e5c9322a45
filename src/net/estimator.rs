//! Network condition estimation from the arriving media stream.
//!
//! Memory is O(1) regardless of run length: only cumulative counters and
//! the current bandwidth window are kept, never per-packet samples.

use std::time::{Duration, Instant};

/// Default bandwidth accounting window.
pub const DEFAULT_BANDWIDTH_WINDOW: Duration = Duration::from_secs(1);

/// Rolling loss-ratio and bandwidth estimator.
///
/// Loss model: an "expected next sequence" counter is seeded from the first
/// observed sequence + 1. A packet arriving above the expected value counts
/// the gap as loss; the counter then resets to `observed + 1` regardless of
/// direction. Large reorders therefore register as loss and a backward jump
/// resets the counter without adding any — an approximation this estimator
/// deliberately keeps (sequence numbers are the raw wire u16, so a wrap
/// behaves like a backward jump).
#[derive(Debug)]
pub struct NetworkEstimator {
    expected_next: Option<u16>,
    received: u64,
    lost: u64,
    window: Duration,
    window_start: Instant,
    window_bytes: u64,
    last_bandwidth: f64,
}

impl NetworkEstimator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_BANDWIDTH_WINDOW)
    }

    /// Use a custom bandwidth window (the window closes once at least this
    /// much time has elapsed).
    pub fn with_window(window: Duration) -> Self {
        Self {
            expected_next: None,
            received: 0,
            lost: 0,
            window,
            window_start: Instant::now(),
            window_bytes: 0,
            last_bandwidth: 0.0,
        }
    }

    /// Account one decoded media packet.
    pub fn record_packet(&mut self, sequence: u16, payload_len: usize) {
        match self.expected_next {
            None => {}
            Some(expected) => {
                if sequence > expected {
                    let gap = u64::from(sequence - expected);
                    self.lost += gap;
                    tracing::debug!(expected, observed = sequence, gap, "sequence gap counted as loss");
                }
            }
        }
        self.expected_next = Some(sequence.wrapping_add(1));
        self.received += 1;

        self.window_bytes += payload_len as u64;
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.last_bandwidth = self.window_bytes as f64 / elapsed.as_secs_f64();
            self.window_bytes = 0;
            self.window_start = Instant::now();
        }
    }

    /// `lost / (received + lost)`, or 0 when nothing has been observed.
    pub fn loss_ratio(&self) -> f64 {
        let total = self.received + self.lost;
        if total == 0 {
            return 0.0;
        }
        self.lost as f64 / total as f64
    }

    /// Bytes per second over the last completed window; 0 until the first
    /// window closes. Constant between window closures.
    pub fn bandwidth_bps(&self) -> f64 {
        self.last_bandwidth
    }

    pub fn packets_received(&self) -> u64 {
        self.received
    }

    pub fn packets_lost(&self) -> u64 {
        self.lost
    }
}

impl Default for NetworkEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Round-trip probe for the control channel.
///
/// Requests are serial (one outstanding at a time), so a single
/// `(cseq, send time)` pair suffices; a reply bearing any other sequence
/// leaves the measurement untouched.
#[derive(Debug, Default)]
pub struct LatencyProbe {
    outstanding: Option<(u64, Instant)>,
    last_rtt_ms: f64,
}

impl LatencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that the request with this sequence was just sent.
    pub fn record_send(&mut self, cseq: u64) {
        self.outstanding = Some((cseq, Instant::now()));
    }

    /// Note a reply; updates the RTT only when the sequence matches the
    /// outstanding request.
    pub fn record_reply(&mut self, cseq: u64) {
        if let Some((sent_cseq, at)) = self.outstanding
            && sent_cseq == cseq
        {
            self.last_rtt_ms = at.elapsed().as_secs_f64() * 1000.0;
            self.outstanding = None;
        }
    }

    /// Most recent control round-trip in milliseconds (0 before the first
    /// matched reply).
    pub fn last_rtt_ms(&self) -> f64 {
        self.last_rtt_ms
    }
}
