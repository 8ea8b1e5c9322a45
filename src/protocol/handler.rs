use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::media::{Fragmenter, VideoSource};
use crate::net::PacingControl;
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::server::{MediaSender, SenderConfig, SourceFactory};
use crate::session::{self, Session, SessionRole, SessionState};
use crate::stats::SendMonitor;

/// Handles control requests for a single connection on the responder side.
///
/// Exclusively owns the connection's [`Session`]; the media send path only
/// observes its stop flag. Returns `None` for requests that do not match
/// the session's current state — they are silently ignored, with no reply
/// and no state change. This is deliberate idempotency against duplicated
/// or retransmitted requests, not an error path.
pub struct MethodHandler {
    session: Session,
    factory: SourceFactory,
    peer_ip: IpAddr,
    config: Arc<SenderConfig>,
    pacing: PacingControl,
    monitor: Arc<SendMonitor>,
    source: Option<Arc<Mutex<Box<dyn VideoSource>>>>,
    fragmenter: Option<Arc<Mutex<Fragmenter>>>,
    client_media_addr: Option<SocketAddr>,
    sender: Option<MediaSender>,
}

impl MethodHandler {
    pub fn new(
        factory: SourceFactory,
        peer_ip: IpAddr,
        config: Arc<SenderConfig>,
        pacing: PacingControl,
        monitor: Arc<SendMonitor>,
    ) -> Self {
        MethodHandler {
            session: Session::new(SessionRole::Responder),
            factory,
            peer_ip,
            config,
            pacing,
            monitor,
            source: None,
            fragmenter: None,
            client_media_addr: None,
            sender: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        match request.method {
            Method::Setup => self.handle_setup(request),
            Method::Play => self.handle_play(request),
            Method::Pause => self.handle_pause(request),
            Method::Teardown => self.handle_teardown(request),
        }
    }

    fn handle_setup(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        if self.session.state() != SessionState::Init {
            tracing::debug!(cseq = request.cseq, state = ?self.session.state(), "SETUP ignored in current state");
            return None;
        }

        let Some(client_port) = request.client_port else {
            tracing::warn!(cseq = request.cseq, "SETUP missing media port, dropping request");
            return None;
        };

        let mut source = match (self.factory)(&request.resource) {
            Some(source) => source,
            None => {
                tracing::warn!(resource = %request.resource, "SETUP for unavailable source");
                return Some(RtspResponse::not_found(request.cseq, self.session.id()));
            }
        };
        source.reset();

        self.session.set_id(session::generate_session_id());
        self.source = Some(Arc::new(Mutex::new(source)));
        self.fragmenter = Some(Arc::new(Mutex::new(
            Fragmenter::with_random_ssrc(self.config.payload_type)
                .with_limits(self.config.mtu, self.config.header_overhead),
        )));
        self.client_media_addr = Some(SocketAddr::new(self.peer_ip, client_port));
        self.session.transition(SessionState::Ready);

        tracing::info!(
            session_id = self.session.id(),
            resource = %request.resource,
            client_media = %self.client_media_addr.as_ref().map(ToString::to_string).unwrap_or_default(),
            "session established via SETUP"
        );

        Some(RtspResponse::ok(request.cseq, self.session.id()))
    }

    fn handle_play(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        if self.session.state() != SessionState::Ready {
            tracing::debug!(cseq = request.cseq, state = ?self.session.state(), "PLAY ignored in current state");
            return None;
        }

        // Both are set during SETUP; Ready cannot be reached without them.
        let (Some(source), Some(fragmenter), Some(dest)) = (
            self.source.clone(),
            self.fragmenter.clone(),
            self.client_media_addr,
        ) else {
            tracing::warn!(cseq = request.cseq, "PLAY without media context, dropping request");
            return None;
        };

        match MediaSender::start(
            source,
            fragmenter,
            dest,
            self.config.clone(),
            self.pacing.clone(),
            self.monitor.clone(),
        ) {
            Ok(sender) => {
                self.sender = Some(sender);
                self.session.transition(SessionState::Playing);
                tracing::info!(session_id = self.session.id(), "session playing");
                Some(RtspResponse::ok(request.cseq, self.session.id()))
            }
            Err(e) => {
                tracing::error!(session_id = self.session.id(), error = %e, "failed to start media send path");
                Some(RtspResponse::connection_error(request.cseq, self.session.id()))
            }
        }
    }

    fn handle_pause(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        if self.session.state() != SessionState::Playing {
            tracing::debug!(cseq = request.cseq, state = ?self.session.state(), "PAUSE ignored in current state");
            return None;
        }

        self.stop_sender();
        self.session.transition(SessionState::Ready);
        tracing::info!(session_id = self.session.id(), "session paused");
        Some(RtspResponse::ok(request.cseq, self.session.id()))
    }

    /// TEARDOWN applies in any state and is terminal for this session
    /// instance: the send path stops and media resources are released.
    fn handle_teardown(&mut self, request: &RtspRequest) -> Option<RtspResponse> {
        self.release_media();
        self.session.transition(SessionState::Init);
        tracing::info!(session_id = self.session.id(), "session terminated via TEARDOWN");
        Some(RtspResponse::ok(request.cseq, self.session.id()))
    }

    /// Release everything on connection drop, mirroring teardown.
    pub fn shutdown(&mut self) {
        if self.source.is_some() || self.sender.is_some() {
            tracing::info!(session_id = self.session.id(), "releasing session on disconnect");
        }
        self.release_media();
        self.session.transition(SessionState::Init);
    }

    fn stop_sender(&mut self) {
        if let Some(mut sender) = self.sender.take() {
            sender.stop();
        }
    }

    fn release_media(&mut self) {
        self.stop_sender();
        self.source = None;
        self.fragmenter = None;
        self.client_media_addr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::counting_factory;

    fn handler_for(factory: SourceFactory) -> MethodHandler {
        MethodHandler::new(
            factory,
            "127.0.0.1".parse().unwrap(),
            Arc::new(SenderConfig::default()),
            PacingControl::new(),
            Arc::new(SendMonitor::new()),
        )
    }

    fn setup_request(cseq: u64) -> RtspRequest {
        RtspRequest::parse(&RtspRequest::serialize_setup("movie.mjpeg", cseq, 25000)).unwrap()
    }

    fn in_session_request(method: Method, cseq: u64, session_id: u32) -> RtspRequest {
        RtspRequest::parse(&RtspRequest::serialize_in_session(
            method,
            "movie.mjpeg",
            cseq,
            session_id,
        ))
        .unwrap()
    }

    #[test]
    fn setup_assigns_session_and_moves_to_ready() {
        let mut h = handler_for(counting_factory(&["movie.mjpeg"]));
        let resp = h.handle(&setup_request(1)).unwrap();
        assert_eq!(resp.status.code(), 200);
        assert_eq!(resp.cseq, 1);
        assert_ne!(resp.session_id, 0);
        assert_eq!(h.session().state(), SessionState::Ready);
    }

    #[test]
    fn setup_unknown_source_replies_404_stays_init() {
        let mut h = handler_for(counting_factory(&["other.mjpeg"]));
        let resp = h.handle(&setup_request(1)).unwrap();
        assert_eq!(resp.status.code(), 404);
        assert_eq!(h.session().state(), SessionState::Init);
        assert_eq!(h.session().id(), 0);
    }

    #[test]
    fn duplicate_setup_silently_ignored() {
        let mut h = handler_for(counting_factory(&["movie.mjpeg"]));
        let first = h.handle(&setup_request(1)).unwrap();
        assert!(h.handle(&setup_request(2)).is_none());
        // original session identity intact
        assert_eq!(h.session().id(), first.session_id);
        assert_eq!(h.session().state(), SessionState::Ready);
    }

    #[test]
    fn play_before_setup_silently_ignored() {
        let mut h = handler_for(counting_factory(&["movie.mjpeg"]));
        assert!(h.handle(&in_session_request(Method::Play, 1, 1)).is_none());
        assert_eq!(h.session().state(), SessionState::Init);
    }

    #[test]
    fn full_lifecycle_setup_play_pause_teardown() {
        let mut h = handler_for(counting_factory(&["movie.mjpeg"]));
        let sid = h.handle(&setup_request(1)).unwrap().session_id;

        let play = h.handle(&in_session_request(Method::Play, 2, sid)).unwrap();
        assert_eq!(play.status.code(), 200);
        assert_eq!(h.session().state(), SessionState::Playing);

        // PLAY while playing is a retransmit: ignored
        assert!(h.handle(&in_session_request(Method::Play, 3, sid)).is_none());

        let pause = h.handle(&in_session_request(Method::Pause, 4, sid)).unwrap();
        assert_eq!(pause.status.code(), 200);
        assert_eq!(h.session().state(), SessionState::Ready);

        // PAUSE while paused: ignored
        assert!(h.handle(&in_session_request(Method::Pause, 5, sid)).is_none());

        // resume
        let resume = h.handle(&in_session_request(Method::Play, 6, sid)).unwrap();
        assert_eq!(resume.status.code(), 200);

        let teardown = h
            .handle(&in_session_request(Method::Teardown, 7, sid))
            .unwrap();
        assert_eq!(teardown.status.code(), 200);
        assert_eq!(h.session().state(), SessionState::Init);
    }

    #[test]
    fn teardown_valid_in_any_state() {
        let mut h = handler_for(counting_factory(&["movie.mjpeg"]));
        let resp = h.handle(&in_session_request(Method::Teardown, 1, 0)).unwrap();
        assert_eq!(resp.status.code(), 200);
        assert_eq!(h.session().state(), SessionState::Init);
    }
}
