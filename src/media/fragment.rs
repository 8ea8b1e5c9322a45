//! Frame fragmentation.
//!
//! Splits oversized frames into MTU-sized media packets. A frame whose
//! payload fits within `mtu - header_overhead` becomes a single fragment
//! with `total_fragments = 1`; larger frames are split into consecutive
//! chunks with ascending fragment indices starting at 0. The marker bit is
//! set only on the last fragment. Transmission order equals index order,
//! but the receiver never assumes arrival order.

use rand::RngExt;

use super::packet::{MediaPacket, RTP_VERSION};

/// Default maximum transmission unit in bytes.
pub const DEFAULT_MTU: usize = 1400;

/// Default header overhead subtracted from the MTU before chunking.
pub const DEFAULT_HEADER_OVERHEAD: usize = 12;

/// Payload type for motion-JPEG frames (RFC 3551 §6).
pub const PAYLOAD_TYPE_MJPEG: u8 = 26;

/// Stateful frame fragmenter.
///
/// Owns the per-session sequence counter (16-bit, wrapping — incremented on
/// every packet) and the SSRC placeholder. One fragmenter per media send
/// path; it survives pause/resume so sequence numbers stay monotonic for
/// the session.
#[derive(Debug)]
pub struct Fragmenter {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    mtu: usize,
    header_overhead: usize,
}

impl Fragmenter {
    /// Create with explicit payload type and SSRC.
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            sequence: 0,
            mtu: DEFAULT_MTU,
            header_overhead: DEFAULT_HEADER_OVERHEAD,
        }
    }

    /// Create with a random SSRC to avoid trivial cross-session collisions.
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(payload_type, rand::rng().random::<u32>())
    }

    /// Override the MTU and header overhead (defaults 1400 / 12).
    pub fn with_limits(mut self, mtu: usize, header_overhead: usize) -> Self {
        self.mtu = mtu;
        self.header_overhead = header_overhead;
        self
    }

    /// Sequence number the next packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Largest payload a single fragment may carry.
    fn chunk_budget(&self) -> usize {
        self.mtu.saturating_sub(self.header_overhead).max(1)
    }

    /// Split one frame into media packets, in ascending fragment order.
    pub fn fragment(&mut self, frame_id: u32, frame: &[u8]) -> Vec<MediaPacket> {
        let budget = self.chunk_budget();
        let total = frame.len().div_ceil(budget).max(1);
        let mut packets = Vec::with_capacity(total);

        let mut offset = 0usize;
        let mut index: u16 = 0;
        loop {
            let remaining = frame.len() - offset;
            let chunk_size = remaining.min(budget);
            let last = remaining <= budget;

            packets.push(MediaPacket {
                version: RTP_VERSION,
                padding: false,
                extension: false,
                csrc_count: 0,
                marker: last,
                payload_type: self.payload_type,
                sequence: self.sequence,
                timestamp: 0,
                ssrc: self.ssrc,
                frame_id,
                fragment_index: index,
                total_fragments: total as u16,
                payload: frame[offset..offset + chunk_size].to_vec(),
            });

            self.sequence = self.sequence.wrapping_add(1);
            if last {
                break;
            }
            offset += chunk_size;
            index += 1;
        }

        if packets.len() > 1 {
            tracing::trace!(
                frame_id,
                frame_bytes = frame.len(),
                fragments = packets.len(),
                "frame fragmented"
            );
        }

        packets
    }

    /// Fragment and serialize one frame into wire-ready datagrams.
    pub fn packetize(&mut self, frame_id: u32, frame: &[u8]) -> Vec<Vec<u8>> {
        self.fragment(frame_id, frame)
            .iter()
            .map(MediaPacket::encode)
            .collect()
    }
}
