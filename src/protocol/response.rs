//! Control-channel replies: the responder's builder and the initiator's
//! tolerant parser.
//!
//! Wire format:
//!
//! ```text
//! RTSP/1.0 <status> <reason>
//! CSeq: <integer>
//! Session: <integer>
//! ```

/// Status codes used on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    ConnectionError,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
            Self::ConnectionError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "Not Found",
            Self::ConnectionError => "Connection Error",
        }
    }
}

/// A reply built by the responder.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status: StatusCode,
    pub cseq: u64,
    pub session_id: u32,
}

impl RtspResponse {
    pub fn ok(cseq: u64, session_id: u32) -> Self {
        Self {
            status: StatusCode::Ok,
            cseq,
            session_id,
        }
    }

    pub fn not_found(cseq: u64, session_id: u32) -> Self {
        Self {
            status: StatusCode::NotFound,
            cseq,
            session_id,
        }
    }

    pub fn connection_error(cseq: u64, session_id: u32) -> Self {
        Self {
            status: StatusCode::ConnectionError,
            cseq,
            session_id,
        }
    }

    /// Serialize to the reply wire format.
    pub fn serialize(&self) -> String {
        format!(
            "RTSP/1.0 {} {}\nCSeq: {}\nSession: {}",
            self.status.code(),
            self.status.reason(),
            self.cseq,
            self.session_id
        )
    }
}

/// A reply as parsed by the initiator.
///
/// Replies arrive over the network and are untrusted: parsing never fails
/// hard. Anything without a numeric status and CSeq yields `None` and is
/// discarded by the caller; a missing session field is tolerated (older
/// peers omit it on errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtspReply {
    pub status: u16,
    pub cseq: u64,
    pub session_id: Option<u32>,
}

impl RtspReply {
    pub fn parse(raw: &str) -> Option<Self> {
        let lines: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() < 2 {
            return None;
        }

        let status = lines[0].split_whitespace().nth(1)?.parse::<u16>().ok()?;
        let cseq = second_field(lines[1])?.parse::<u64>().ok()?;
        let session_id = lines
            .get(2)
            .and_then(|line| second_field(line))
            .and_then(|value| value.parse::<u32>().ok());

        Some(RtspReply {
            status,
            cseq,
            session_id,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

fn second_field(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}
