//! Initiator side: control-channel driving, media reception, and playback.
//!
//! A [`Player`] owns one session lifecycle against a remote responder. Four
//! concurrent activities cooperate through shared, lock-guarded structures
//! rather than calling into each other:
//!
//! - the **control side** (request senders plus the reply listener thread),
//!   sole owner of the [`Session`] state;
//! - the **media receiver** thread, decoding datagrams into the reassembly
//!   buffer and feeding the estimator;
//! - the **consumer** thread, popping assembled frames to the
//!   [`FrameSink`];
//! - the reassembly buffer's own background sweep.
//!
//! A session-wide stop signal (set once, observed everywhere) ends the
//! media loops; the control socket uses a bounded read timeout so the
//! listener can observe it too.

use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::{BufferConfig, FrameBuffer};
use crate::error::{Result, StreamError};
use crate::media::{FrameSink, MediaPacket};
use crate::net::{
    AdaptiveConfig, AdaptiveController, LatencyProbe, NetworkEstimator, NetworkStats,
};
use crate::protocol::{Method, RtspReply, RtspRequest};
use crate::session::{Session, SessionRole, SessionState};
use crate::stats::StatsSnapshot;
use crate::transport::udp;

/// Initiator-side tunables.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Local media receive port advertised at SETUP; 0 binds an ephemeral
    /// port.
    pub media_port: u16,
    /// Bounded wait on both the media and control sockets, so loops can
    /// re-check termination flags.
    pub recv_timeout: Duration,
    /// Consumer sleep when no assembled frame is available.
    pub consumer_idle: Duration,
    /// Nominal playback interval between displayed frames.
    pub frame_interval: Duration,
    /// Control-channel send retries before giving up.
    pub send_retries: u32,
    /// Sleep between control-channel send retries.
    pub retry_backoff: Duration,
    pub buffer: BufferConfig,
    pub adaptive: AdaptiveConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            media_port: 0,
            recv_timeout: Duration::from_millis(500),
            consumer_idle: Duration::from_millis(5),
            frame_interval: Duration::from_millis(33),
            send_retries: 3,
            retry_backoff: Duration::from_millis(100),
            buffer: BufferConfig::default(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// What applying a control reply did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Stale sequence or foreign session id; nothing happened.
    Discarded,
    /// Reply accepted but no transition (non-success status, or a
    /// duplicate of an already-applied reply).
    NoChange,
    BecameReady,
    StartedPlaying,
    Paused,
    TornDown,
}

/// Apply one parsed reply to the session, enforcing the initiator's
/// discard rules:
///
/// - a reply whose sequence is not the most recently sent one is stale or
///   duplicated and is discarded;
/// - the first session identifier seen is adopted; replies bearing a
///   different one afterwards are discarded;
/// - only a success status advances state; anything else leaves the
///   session untouched.
///
/// Because the outstanding request kind is cleared on application, a
/// duplicated success reply applies at most once.
pub fn apply_reply(session: &mut Session, reply: &RtspReply) -> ReplyOutcome {
    if reply.cseq != session.last_cseq() {
        tracing::debug!(
            reply_cseq = reply.cseq,
            last_cseq = session.last_cseq(),
            "discarding reply with stale sequence"
        );
        return ReplyOutcome::Discarded;
    }

    if let Some(sid) = reply.session_id {
        if session.id() == 0 {
            session.set_id(sid);
        } else if sid != session.id() {
            tracing::warn!(
                reply_session = sid,
                session_id = session.id(),
                "discarding reply for foreign session"
            );
            return ReplyOutcome::Discarded;
        }
    }

    if !reply.is_ok() {
        tracing::warn!(status = reply.status, cseq = reply.cseq, "request failed, state unchanged");
        return ReplyOutcome::NoChange;
    }

    let Some(outstanding) = session.outstanding() else {
        return ReplyOutcome::NoChange;
    };
    session.clear_outstanding();

    match outstanding {
        Method::Setup => {
            session.transition(SessionState::Ready);
            ReplyOutcome::BecameReady
        }
        Method::Play => {
            session.transition(SessionState::Playing);
            ReplyOutcome::StartedPlaying
        }
        Method::Pause => {
            session.transition(SessionState::Ready);
            ReplyOutcome::Paused
        }
        Method::Teardown => {
            session.transition(SessionState::Init);
            ReplyOutcome::TornDown
        }
    }
}

/// Streaming player: one control connection, one media receive path.
pub struct Player {
    control: TcpStream,
    resource: String,
    config: PlayerConfig,
    session: Arc<Mutex<Session>>,
    media_socket: Arc<UdpSocket>,
    media_port: u16,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    media_started: Arc<AtomicBool>,
    buffer: Arc<FrameBuffer>,
    estimator: Arc<Mutex<NetworkEstimator>>,
    controller: Mutex<AdaptiveController>,
    latency: Arc<Mutex<LatencyProbe>>,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Player {
    /// Connect the control channel and bind the media receive socket.
    /// Spawns the reply listener; media threads start once PLAY succeeds.
    pub fn connect(
        server_addr: &str,
        resource: &str,
        sink: Box<dyn FrameSink>,
        config: PlayerConfig,
    ) -> Result<Self> {
        let control = TcpStream::connect(server_addr)?;
        control.set_read_timeout(Some(config.recv_timeout))?;

        let media_socket = udp::bind_receiver(config.media_port, config.recv_timeout)?;
        let media_port = media_socket.local_addr()?.port();

        let player = Player {
            control,
            resource: resource.to_string(),
            session: Arc::new(Mutex::new(Session::new(SessionRole::Initiator))),
            media_socket: Arc::new(media_socket),
            media_port,
            stop: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            media_started: Arc::new(AtomicBool::new(false)),
            buffer: Arc::new(FrameBuffer::new(config.buffer.clone())),
            estimator: Arc::new(Mutex::new(NetworkEstimator::new())),
            controller: Mutex::new(AdaptiveController::new(config.adaptive.clone())),
            latency: Arc::new(Mutex::new(LatencyProbe::new())),
            sink: Arc::new(Mutex::new(sink)),
            config,
            threads: Mutex::new(Vec::new()),
        };

        player.spawn_reply_listener()?;
        tracing::info!(server = server_addr, resource, media_port, "player connected");
        Ok(player)
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state()
    }

    pub fn session_id(&self) -> u32 {
        self.session.lock().id()
    }

    /// Request session establishment. No-op unless the session is in `Init`.
    pub fn setup(&self) -> Result<()> {
        self.send_request(Method::Setup, SessionState::Init)
    }

    /// Request playback. No-op unless the session is in `Ready`.
    pub fn play(&self) -> Result<()> {
        self.send_request(Method::Play, SessionState::Ready)
    }

    /// Request pause. No-op unless the session is in `Playing`.
    pub fn pause(&self) -> Result<()> {
        self.send_request(Method::Pause, SessionState::Playing)
    }

    /// Request teardown. Applies in any state except `Init`.
    pub fn teardown(&self) -> Result<()> {
        if self.state() == SessionState::Init {
            tracing::debug!("teardown skipped, session not established");
            return Ok(());
        }
        self.send_with_retry(Method::Teardown)
    }

    /// Current network health and playback statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let (loss_ratio, bandwidth_bps) = {
            let estimator = self.estimator.lock();
            (estimator.loss_ratio(), estimator.bandwidth_bps())
        };
        let latency_ms = self.latency.lock().last_rtt_ms();
        let stats = NetworkStats {
            latency_ms,
            packet_loss: loss_ratio,
            bandwidth_bps,
        };
        let (tier, recommended_delay) = self.controller.lock().update(&stats);
        StatsSnapshot {
            loss_ratio,
            bandwidth_bps,
            latency_ms,
            tier,
            recommended_delay,
            buffer_health: self.buffer.buffer_health(),
        }
    }

    /// Stop every activity and release local sockets. Idempotent; also
    /// runs on drop.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.buffer.stop();
    }

    fn send_request(&self, method: Method, required_state: SessionState) -> Result<()> {
        if self.state() != required_state {
            tracing::debug!(method = %method, state = ?self.state(), "request skipped in current state");
            return Ok(());
        }
        self.send_with_retry(method)
    }

    /// Serialize and send one request, with a bounded retry-sleep-retry
    /// loop. A network error while a teardown is in flight counts as a
    /// clean shutdown; exhausting the retries otherwise is the one
    /// terminal error this path surfaces.
    fn send_with_retry(&self, method: Method) -> Result<()> {
        let text = {
            let mut session = self.session.lock();
            let cseq = session.next_request(method);
            self.latency.lock().record_send(cseq);
            match method {
                Method::Setup => RtspRequest::serialize_setup(&self.resource, cseq, self.media_port),
                _ => RtspRequest::serialize_in_session(method, &self.resource, cseq, session.id()),
            }
        };

        let mut attempts: u32 = 0;
        loop {
            match (&self.control).write_all(text.as_bytes()) {
                Ok(()) => {
                    tracing::debug!(method = %method, "request sent");
                    return Ok(());
                }
                Err(e) if method == Method::Teardown => {
                    tracing::info!(error = %e, "control error during teardown, treating as shutdown");
                    self.stop.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts > self.config.send_retries {
                        tracing::error!(method = %method, attempts, "control send retries exhausted");
                        return Err(StreamError::RetriesExhausted { attempts });
                    }
                    tracing::warn!(method = %method, attempt = attempts, error = %e, "control send failed, retrying");
                    thread::sleep(self.config.retry_backoff);
                }
            }
        }
    }

    fn spawn_reply_listener(&self) -> Result<()> {
        let stream = self.control.try_clone()?;
        let session = self.session.clone();
        let latency = self.latency.clone();
        let stop = self.stop.clone();
        let paused = self.paused.clone();
        let media_started = self.media_started.clone();
        let spawner = self.media_thread_spawner();

        let handle = thread::spawn(move || {
            reply_listener_loop(
                stream,
                session,
                latency,
                stop,
                paused,
                media_started,
                spawner,
            );
        });
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Bundle of shared handles the listener needs to start the media
    /// receiver and consumer once PLAY is acknowledged.
    fn media_thread_spawner(&self) -> MediaThreads {
        MediaThreads {
            socket: self.media_socket.clone(),
            buffer: self.buffer.clone(),
            estimator: self.estimator.clone(),
            sink: self.sink.clone(),
            stop: self.stop.clone(),
            paused: self.paused.clone(),
            consumer_idle: self.config.consumer_idle,
            frame_interval: self.config.frame_interval,
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared handles for the media receiver and consumer threads.
struct MediaThreads {
    socket: Arc<UdpSocket>,
    buffer: Arc<FrameBuffer>,
    estimator: Arc<Mutex<NetworkEstimator>>,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    consumer_idle: Duration,
    frame_interval: Duration,
}

impl MediaThreads {
    /// Start the receiver and consumer. Threads end when the stop signal
    /// is set; their handles are detached on purpose — they hold only
    /// `Arc`s, and the stop flag is the lifecycle authority.
    fn start(&self) {
        let socket = self.socket.clone();
        let buffer = self.buffer.clone();
        let estimator = self.estimator.clone();
        let stop = self.stop.clone();
        thread::spawn(move || {
            media_receiver_loop(socket, buffer, estimator, stop);
        });

        let buffer = self.buffer.clone();
        let sink = self.sink.clone();
        let stop = self.stop.clone();
        let paused = self.paused.clone();
        let idle = self.consumer_idle;
        let interval = self.frame_interval;
        thread::spawn(move || {
            consumer_loop(buffer, sink, stop, paused, idle, interval);
        });
    }
}

/// Read replies off the control socket until stopped. The socket carries a
/// bounded read timeout, so the loop re-checks the stop flag even when the
/// responder goes quiet.
fn reply_listener_loop(
    mut stream: TcpStream,
    session: Arc<Mutex<Session>>,
    latency: Arc<Mutex<LatencyProbe>>,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    media_started: Arc<AtomicBool>,
    media: MediaThreads,
) {
    let mut buf = [0u8; 1024];
    while !stop.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                let teardown_in_flight =
                    session.lock().outstanding() == Some(Method::Teardown);
                if teardown_in_flight {
                    tracing::info!("control closed during teardown, clean shutdown");
                } else {
                    tracing::warn!("control connection closed by server");
                }
                stop.store(true, Ordering::SeqCst);
                break;
            }
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                if session.lock().outstanding() == Some(Method::Teardown) {
                    tracing::info!(error = %e, "control error during teardown, clean shutdown");
                    stop.store(true, Ordering::SeqCst);
                    break;
                }
                tracing::warn!(error = %e, "control read error, retrying");
                thread::sleep(Duration::from_millis(100));
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..n]);
        let Some(reply) = RtspReply::parse(&text) else {
            tracing::warn!("discarding malformed control reply");
            continue;
        };

        latency.lock().record_reply(reply.cseq);

        let outcome = apply_reply(&mut session.lock(), &reply);
        match outcome {
            ReplyOutcome::StartedPlaying => {
                paused.store(false, Ordering::SeqCst);
                if !media_started.swap(true, Ordering::SeqCst) {
                    media.start();
                }
            }
            ReplyOutcome::Paused => {
                paused.store(true, Ordering::SeqCst);
            }
            ReplyOutcome::TornDown => {
                tracing::info!("teardown acknowledged, releasing media receive path");
                stop.store(true, Ordering::SeqCst);
                break;
            }
            ReplyOutcome::Discarded | ReplyOutcome::NoChange | ReplyOutcome::BecameReady => {}
        }
    }
    tracing::debug!("reply listener exited");
}

/// Receive datagrams, decode, account, and feed the reassembly buffer.
/// Truncated or corrupt datagrams are dropped without touching any state.
fn media_receiver_loop(
    socket: Arc<UdpSocket>,
    buffer: Arc<FrameBuffer>,
    estimator: Arc<Mutex<NetworkEstimator>>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 65535];
    while !stop.load(Ordering::SeqCst) {
        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            // timeout: wake up to re-check the stop flag
            Err(_) => continue,
        };

        let Some(packet) = MediaPacket::decode(&buf[..n]) else {
            continue;
        };

        estimator
            .lock()
            .record_packet(packet.sequence, packet.payload.len());
        buffer.add_fragment(
            packet.frame_id,
            packet.fragment_index,
            packet.total_fragments,
            packet.payload,
        );
    }
    tracing::debug!("media receiver exited");
}

/// Drain assembled frames to the sink at the playback cadence, sleeping
/// briefly when the buffer runs dry instead of busy-spinning.
fn consumer_loop(
    buffer: Arc<FrameBuffer>,
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    idle: Duration,
    frame_interval: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        if paused.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
            continue;
        }
        match buffer.pop_next() {
            Some(frame) => {
                sink.lock().display(&frame);
                thread::sleep(frame_interval);
            }
            None => thread::sleep(idle),
        }
    }
    tracing::debug!("consumer exited");
}
