//! Media wire codec, fragmentation, and collaborator seams.
//!
//! The media channel is best-effort: datagrams may be lost, duplicated, or
//! reordered, and nothing here retransmits. The sender turns frames into
//! datagrams ([`Fragmenter`]); the receiver turns datagrams back into
//! frames ([`crate::buffer::FrameBuffer`]). [`packet`] is the shared wire
//! format between the two.
//!
//! The actual frame producer and consumer live outside this crate, behind
//! the [`VideoSource`] and [`FrameSink`] traits.

pub mod fragment;
pub mod packet;

pub use fragment::Fragmenter;
pub use packet::MediaPacket;

/// Supplier of raw frame bytes to the send path.
///
/// Implemented by the on-disk (or synthetic) video source. The send path
/// calls [`next_frame`](Self::next_frame) once per pacing interval; `None`
/// means the source is exhausted.
pub trait VideoSource: Send {
    /// The next raw frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Option<Vec<u8>>;

    /// Number of the most recently returned frame (1-based after the first
    /// [`next_frame`](Self::next_frame) call). Used as the frame identifier
    /// on the wire.
    fn frame_number(&self) -> u32;

    /// Rewind to the first frame.
    fn reset(&mut self);
}

/// Consumer of assembled frames on the receive path.
pub trait FrameSink: Send {
    /// Present one complete frame. Called from the player's consumer
    /// thread; implementations should return promptly.
    fn display(&mut self, frame: &[u8]);
}
