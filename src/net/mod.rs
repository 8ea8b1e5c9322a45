//! Network health estimation and adaptive control.
//!
//! [`estimator`] watches the arriving media stream and produces a loss
//! ratio and bandwidth estimate; [`adapt`] turns those (plus control-channel
//! latency) into a quality tier and pacing recommendation.

pub mod adapt;
pub mod estimator;

pub use adapt::{AdaptiveConfig, AdaptiveController, PacingControl, ProfileSet, QualityProfile, QualityTier};
pub use estimator::{LatencyProbe, NetworkEstimator};

/// Point-in-time network health inputs for the adaptive controller.
///
/// `latency_ms` comes from the control-channel round-trip probe,
/// `packet_loss` and `bandwidth_bps` from the media-stream estimator
/// (bandwidth in bytes per second).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStats {
    pub latency_ms: f64,
    pub packet_loss: f64,
    pub bandwidth_bps: f64,
}
