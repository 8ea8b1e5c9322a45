//! Media packet wire codec.
//!
//! Every media datagram carries a 12-byte RTP fixed header (RFC 3550 §5.1
//! layout) followed by an 8-byte fragmentation extension:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Frame ID                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Fragment Index         |        Total Fragments        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The fragmentation extension groups datagrams back into logical frames:
//! all fragments of one frame share a frame ID, carry ascending indices,
//! and declare the same total count. Timestamp and SSRC are carried but not
//! interpreted by the receive path.
//!
//! Decoding is the trust boundary for the media channel: truncated or
//! corrupt datagrams decode to `None` and are dropped by the caller, with
//! no effect on reassembly state.

/// RTP protocol version written into every header.
pub const RTP_VERSION: u8 = 2;

/// Length of the RTP fixed header in bytes.
pub const FIXED_HEADER_LEN: usize = 12;

/// Length of the fragmentation extension in bytes.
pub const FRAGMENT_EXT_LEN: usize = 8;

/// Total header bytes preceding the payload in every media datagram.
pub const FULL_HEADER_LEN: usize = FIXED_HEADER_LEN + FRAGMENT_EXT_LEN;

/// A decoded media packet. Immutable after decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    /// Contributor (CSRC) count. Always written as 0; preserved on decode.
    pub csrc_count: u8,
    /// Set only on the last fragment of a frame.
    pub marker: bool,
    pub payload_type: u8,
    /// Monotonic per session (wrapping u16); drives loss/reorder detection.
    pub sequence: u16,
    /// Media clock placeholder; carried, not interpreted.
    pub timestamp: u32,
    /// Synchronization source placeholder; carried, not interpreted.
    pub ssrc: u32,
    /// Groups fragments of one logical frame.
    pub frame_id: u32,
    pub fragment_index: u16,
    pub total_fragments: u16,
    pub payload: Vec<u8>,
}

impl MediaPacket {
    /// Serialize to the fixed-width wire format (header + payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FULL_HEADER_LEN + self.payload.len());

        let first_byte = (self.version << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0f);
        let second_byte = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);

        buf.push(first_byte);
        buf.push(second_byte);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&self.frame_id.to_be_bytes());
        buf.extend_from_slice(&self.fragment_index.to_be_bytes());
        buf.extend_from_slice(&self.total_fragments.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a datagram. Returns `None` for anything shorter than the
    /// full header — the caller drops such packets silently.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < FULL_HEADER_LEN {
            tracing::trace!(len = data.len(), "dropping truncated media packet");
            return None;
        }

        let version = data[0] >> 6;
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = data[0] & 0x0f;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let frame_id = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        let fragment_index = u16::from_be_bytes([data[16], data[17]]);
        let total_fragments = u16::from_be_bytes([data[18], data[19]]);

        Some(MediaPacket {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            frame_id,
            fragment_index,
            total_fragments,
            payload: data[FULL_HEADER_LEN..].to_vec(),
        })
    }
}
