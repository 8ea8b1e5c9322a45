//! Session state machine, shared by both ends of the control channel.
//!
//! A session is one control-channel negotiation lifecycle:
//!
//! ```text
//! SETUP    Init -> Ready
//! PLAY     Ready -> Playing
//! PAUSE    Playing -> Ready
//! TEARDOWN any -> Init      (terminal for this session instance)
//! ```
//!
//! The struct is owned by exactly one logical owner — the responder's
//! connection handler or the initiator's control side — and mutated only
//! through its transition methods. Media-side activities never touch it;
//! they observe shared stop flags instead.

use rand::RngExt;

use crate::protocol::Method;

/// Which end of the control channel this session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sends requests; the player side.
    Initiator,
    /// Assigns the session identifier and replies; the server side.
    Responder,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No media resources allocated. Also the terminal state after teardown.
    Init,
    /// Set up and idle (or paused).
    Ready,
    /// Media flowing.
    Playing,
}

/// Per-connection session state.
#[derive(Debug)]
pub struct Session {
    role: SessionRole,
    state: SessionState,
    /// Assigned by the responder during SETUP; 0 until then.
    id: u32,
    /// Last request sequence number sent (initiator side).
    cseq: u64,
    /// Request kind awaiting a reply (initiator side).
    outstanding: Option<Method>,
}

impl Session {
    pub fn new(role: SessionRole) -> Self {
        Self {
            role,
            state: SessionState::Init,
            id: 0,
            cseq: 0,
            outstanding: None,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session identifier; 0 means not yet assigned.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        tracing::debug!(session_id = id, "session identifier assigned");
        self.id = id;
    }

    /// Sequence number of the most recently sent request.
    pub fn last_cseq(&self) -> u64 {
        self.cseq
    }

    pub fn outstanding(&self) -> Option<Method> {
        self.outstanding
    }

    /// Reserve the next request sequence number and record the outstanding
    /// request kind. Initiator side only.
    pub fn next_request(&mut self, method: Method) -> u64 {
        self.cseq += 1;
        self.outstanding = Some(method);
        self.cseq
    }

    pub fn clear_outstanding(&mut self) {
        self.outstanding = None;
    }

    /// Move to a new state. The only mutation path for `state`.
    pub fn transition(&mut self, to: SessionState) {
        tracing::debug!(
            session_id = self.id,
            role = ?self.role,
            from = ?self.state,
            to = ?to,
            "session state transition"
        );
        self.state = to;
    }
}

/// Generate a responder session identifier: non-zero and random enough to
/// prevent trivial cross-session confusion.
pub fn generate_session_id() -> u32 {
    rand::rng().random_range(100_000..=999_999)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_in_init() {
        let s = Session::new(SessionRole::Initiator);
        assert_eq!(s.state(), SessionState::Init);
        assert_eq!(s.id(), 0);
        assert_eq!(s.last_cseq(), 0);
        assert!(s.outstanding().is_none());
    }

    #[test]
    fn next_request_increments_and_records() {
        let mut s = Session::new(SessionRole::Initiator);
        assert_eq!(s.next_request(Method::Setup), 1);
        assert_eq!(s.outstanding(), Some(Method::Setup));
        assert_eq!(s.next_request(Method::Play), 2);
        assert_eq!(s.outstanding(), Some(Method::Play));
        assert_eq!(s.last_cseq(), 2);
    }

    #[test]
    fn generated_ids_are_nonzero() {
        for _ in 0..100 {
            let id = generate_session_id();
            assert!((100_000..=999_999).contains(&id));
        }
    }
}
