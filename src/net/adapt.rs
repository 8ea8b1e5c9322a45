//! Adaptive quality and pacing decisions.
//!
//! Consumes [`NetworkStats`](super::NetworkStats) and produces a quality
//! tier plus an inter-packet delay recommendation. Tier selection is
//! damped by a minimum adjustment interval so short-lived spikes cannot
//! cause oscillation; the delay recommendation is a plain ordered decision
//! list evaluated on every call.
//!
//! Nothing here applies its output anywhere: how the recommendations reach
//! the send path is an integration decision. [`PacingControl`] is the
//! exposed hook — a shared delay cell the send loop consults once per
//! frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::NetworkStats;

/// Ordered quality levels. Each maps to externally supplied streaming
/// profile parameters; the core only moves between levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Externally supplied profile parameters for one tier. Opaque to the
/// core; carried so integrators can resolve a tier without keeping their
/// own table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityProfile {
    pub resolution: String,
    pub bitrate_kbps: u32,
}

/// Profile parameters for all three tiers.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    pub low: QualityProfile,
    pub medium: QualityProfile,
    pub high: QualityProfile,
}

impl ProfileSet {
    pub fn get(&self, tier: QualityTier) -> &QualityProfile {
        match tier {
            QualityTier::Low => &self.low,
            QualityTier::Medium => &self.medium,
            QualityTier::High => &self.high,
        }
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            low: QualityProfile {
                resolution: "640x480".to_string(),
                bitrate_kbps: 800,
            },
            medium: QualityProfile {
                resolution: "1280x720".to_string(),
                bitrate_kbps: 2500,
            },
            high: QualityProfile {
                resolution: "1920x1080".to_string(),
                bitrate_kbps: 5000,
            },
        }
    }
}

/// Controller weights, thresholds, and intervals. The score combination is
/// a design choice, so every coefficient lives here rather than in the
/// code.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Score below this selects [`QualityTier::Low`].
    pub low_score_threshold: f64,
    /// Score below this (and at or above the low threshold) selects
    /// [`QualityTier::Medium`].
    pub high_score_threshold: f64,
    /// Minimum time between tier adjustments.
    pub min_adjust_interval: Duration,
    /// Loss-term multiplier in the score.
    pub loss_multiplier: f64,
    /// Bandwidth-term divisor in the score.
    pub bandwidth_divisor: f64,
    /// Loss ratio above which the largest delay is recommended.
    pub high_loss_threshold: f64,
    /// Latency (ms) above which the medium delay is recommended.
    pub high_latency_ms: f64,
    pub max_delay: Duration,
    pub medium_delay: Duration,
    pub min_delay: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            low_score_threshold: 120.0,
            high_score_threshold: 200.0,
            min_adjust_interval: Duration::from_secs(2),
            loss_multiplier: 200.0,
            bandwidth_divisor: 10.0,
            high_loss_threshold: 0.1,
            high_latency_ms: 200.0,
            max_delay: Duration::from_millis(120),
            medium_delay: Duration::from_millis(80),
            min_delay: Duration::from_millis(40),
        }
    }
}

/// Tier/delay controller with hysteresis on tier changes.
#[derive(Debug)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    current_tier: QualityTier,
    last_adjust: Option<Instant>,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            current_tier: QualityTier::Medium,
            last_adjust: None,
        }
    }

    pub fn current_tier(&self) -> QualityTier {
        self.current_tier
    }

    /// Combine latency, loss, and bandwidth into one comparable scalar;
    /// higher is better. Each term is clamped to `[0, 100]`.
    pub fn score(&self, stats: &NetworkStats) -> f64 {
        let latency_term = (100.0 - stats.latency_ms).max(0.0);
        let loss_term = (100.0 - stats.packet_loss * self.config.loss_multiplier).max(0.0);
        let bandwidth_term = (stats.bandwidth_bps / self.config.bandwidth_divisor).min(100.0);
        latency_term + loss_term + bandwidth_term
    }

    /// Select a tier for the given score, honoring the minimum adjustment
    /// interval: inside the window the previous tier is returned unchanged
    /// regardless of the score.
    pub fn adjust_tier(&mut self, score: f64) -> QualityTier {
        if let Some(last) = self.last_adjust
            && last.elapsed() < self.config.min_adjust_interval
        {
            return self.current_tier;
        }

        let tier = if score < self.config.low_score_threshold {
            QualityTier::Low
        } else if score < self.config.high_score_threshold {
            QualityTier::Medium
        } else {
            QualityTier::High
        };

        if tier != self.current_tier {
            tracing::info!(from = self.current_tier.as_str(), to = tier.as_str(), score, "quality tier change");
        }
        self.current_tier = tier;
        self.last_adjust = Some(Instant::now());
        tier
    }

    /// Recommend an inter-packet delay. No hysteresis: an ordered decision
    /// list over loss, then latency.
    pub fn recommend_delay(&self, stats: &NetworkStats) -> Duration {
        if stats.packet_loss > self.config.high_loss_threshold {
            return self.config.max_delay;
        }
        if stats.latency_ms > self.config.high_latency_ms {
            return self.config.medium_delay;
        }
        self.config.min_delay
    }

    /// Score, tier adjustment, and delay recommendation in one step.
    pub fn update(&mut self, stats: &NetworkStats) -> (QualityTier, Duration) {
        let score = self.score(stats);
        (self.adjust_tier(score), self.recommend_delay(stats))
    }
}

/// Shared pacing override consulted by the media send loop.
///
/// Zero means "no override": the sender falls back to its frame-size-aware
/// default delay. An integrator feeds controller recommendations in via
/// [`set`](Self::set); this crate never wires that feedback itself.
#[derive(Debug, Clone)]
pub struct PacingControl {
    delay_ms: Arc<AtomicU64>,
}

impl PacingControl {
    pub fn new() -> Self {
        Self {
            delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.delay_ms.store(0, Ordering::Relaxed);
    }

    /// Current override, or `None` when unset.
    pub fn get(&self) -> Option<Duration> {
        match self.delay_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for PacingControl {
    fn default() -> Self {
        Self::new()
    }
}
