//! Adaptive video streaming over a split transport: a TCP control channel
//! for session signaling (SETUP/PLAY/PAUSE/TEARDOWN) and a best-effort UDP
//! datagram channel for the media itself.
//!
//! The crate provides both ends: [`Server`] (responder) reads frames from a
//! [`VideoSource`](media::VideoSource), fragments them to MTU-sized
//! datagrams, and paces them out; [`Player`] (initiator) drives the session
//! handshake, reassembles fragments into frames for a
//! [`FrameSink`](media::FrameSink), and continuously re-estimates network
//! health to feed the adaptive controller.
//!
//! Media delivery is loss-tolerant by design: no retransmission, no
//! ordering guarantee, no encryption.

pub mod buffer;
pub mod error;
pub mod media;
pub mod net;
pub mod player;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use buffer::{BufferConfig, FrameBuffer};
pub use error::{Result, StreamError};
pub use media::{FrameSink, VideoSource};
pub use net::{AdaptiveConfig, AdaptiveController, NetworkEstimator, PacingControl, QualityTier};
pub use player::{Player, PlayerConfig};
pub use server::{SenderConfig, Server, SourceFactory};
pub use session::{SessionRole, SessionState};
pub use stats::StatsSnapshot;
