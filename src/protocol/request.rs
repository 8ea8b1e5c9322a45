use std::fmt;

use crate::error::{ParseErrorKind, StreamError};

/// Control-channel request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "SETUP" => Some(Self::Setup),
            "PLAY" => Some(Self::Play),
            "PAUSE" => Some(Self::Pause),
            "TEARDOWN" => Some(Self::Teardown),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed control-channel request.
///
/// The wire format is newline-separated ASCII:
///
/// ```text
/// Method SP resource-name SP RTSP/1.0
/// CSeq: <integer>
/// Transport: RTP/UDP; client_port=<port>     (SETUP)
/// Session: <integer>                          (PLAY/PAUSE/TEARDOWN)
/// ```
#[derive(Debug)]
pub struct RtspRequest {
    pub method: Method,
    /// Resource name from the request line (e.g. `movie.mjpeg`).
    pub resource: String,
    /// Protocol version token (expected: `RTSP/1.0`).
    pub version: String,
    /// Request sequence number from the `CSeq` line.
    pub cseq: u64,
    /// Media port from the `Transport` line, when present.
    pub client_port: Option<u16>,
    /// Session identifier from the `Session` line, when present.
    pub session_id: Option<u32>,
}

impl RtspRequest {
    /// Parse a request from its text representation.
    ///
    /// Returns [`StreamError::Parse`] on malformed input. The responder
    /// logs and drops such requests without replying.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines().filter(|line| !line.trim().is_empty());

        let request_line = lines.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(StreamError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = Method::from_token(parts[0]).ok_or(StreamError::Parse {
            kind: ParseErrorKind::UnknownMethod,
        })?;
        let resource = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "request carries unexpected protocol version");
        }

        let mut cseq = None;
        let mut client_port = None;
        let mut session_id = None;

        for line in lines {
            let colon_pos = line.find(':').ok_or(StreamError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            let name = line[..colon_pos].trim();
            let value = line[colon_pos + 1..].trim();

            if name.eq_ignore_ascii_case("CSeq") {
                cseq = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("Transport") {
                client_port = parse_client_port(value);
            } else if name.eq_ignore_ascii_case("Session") {
                session_id = value.parse::<u32>().ok();
            }
        }

        let cseq = cseq.ok_or(StreamError::Parse {
            kind: ParseErrorKind::InvalidCseq,
        })?;

        Ok(RtspRequest {
            method,
            resource,
            version,
            cseq,
            client_port,
            session_id,
        })
    }

    /// Serialize a SETUP request carrying the media receive port.
    pub fn serialize_setup(resource: &str, cseq: u64, client_port: u16) -> String {
        format!(
            "SETUP {resource} RTSP/1.0\nCSeq: {cseq}\nTransport: RTP/UDP; client_port={client_port}"
        )
    }

    /// Serialize a PLAY/PAUSE/TEARDOWN request carrying the session id.
    pub fn serialize_in_session(method: Method, resource: &str, cseq: u64, session_id: u32) -> String {
        format!("{method} {resource} RTSP/1.0\nCSeq: {cseq}\nSession: {session_id}")
    }
}

/// Extract `client_port=<port>` from a `Transport` header value, e.g.
/// `RTP/UDP; client_port=25000`.
fn parse_client_port(value: &str) -> Option<u16> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(port) = part.strip_prefix("client_port=") {
            return port.trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setup_request() {
        let raw = "SETUP movie.mjpeg RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port=25000";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Setup);
        assert_eq!(req.resource, "movie.mjpeg");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq, 1);
        assert_eq!(req.client_port, Some(25000));
        assert_eq!(req.session_id, None);
    }

    #[test]
    fn parse_play_request_with_session() {
        let raw = "PLAY movie.mjpeg RTSP/1.0\nCSeq: 2\nSession: 123456";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Play);
        assert_eq!(req.cseq, 2);
        assert_eq!(req.session_id, Some(123456));
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD").is_err());
    }

    #[test]
    fn parse_unknown_method() {
        assert!(RtspRequest::parse("DESCRIBE movie.mjpeg RTSP/1.0\nCSeq: 1").is_err());
    }

    #[test]
    fn parse_missing_cseq() {
        assert!(RtspRequest::parse("PLAY movie.mjpeg RTSP/1.0\nSession: 1").is_err());
    }

    #[test]
    fn parse_non_numeric_cseq() {
        assert!(RtspRequest::parse("PLAY movie.mjpeg RTSP/1.0\nCSeq: abc\nSession: 1").is_err());
    }

    #[test]
    fn serialize_setup_roundtrips() {
        let raw = RtspRequest::serialize_setup("movie.mjpeg", 1, 25000);
        let req = RtspRequest::parse(&raw).unwrap();
        assert_eq!(req.method, Method::Setup);
        assert_eq!(req.cseq, 1);
        assert_eq!(req.client_port, Some(25000));
    }

    #[test]
    fn serialize_in_session_roundtrips() {
        let raw = RtspRequest::serialize_in_session(Method::Teardown, "movie.mjpeg", 7, 424242);
        let req = RtspRequest::parse(&raw).unwrap();
        assert_eq!(req.method, Method::Teardown);
        assert_eq!(req.cseq, 7);
        assert_eq!(req.session_id, Some(424242));
    }
}
