//! End-to-end tests over loopback: the control handshake against a raw TCP
//! client, and full media delivery through a [`Player`].

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use vstream::media::{FrameSink, VideoSource};
use vstream::{Player, PlayerConfig, Server, SessionState, SourceFactory};

/// Deterministic in-memory source: yields the given frames once, then ends.
struct ScriptedSource {
    frames: Vec<Vec<u8>>,
    position: usize,
}

impl VideoSource for ScriptedSource {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let frame = self.frames.get(self.position).cloned()?;
        self.position += 1;
        Some(frame)
    }

    fn frame_number(&self) -> u32 {
        self.position as u32
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

fn scripted_factory(frames: Vec<Vec<u8>>) -> SourceFactory {
    Arc::new(move |resource| {
        if resource == "movie.mjpeg" {
            Some(Box::new(ScriptedSource {
                frames: frames.clone(),
                position: 0,
            }) as Box<dyn VideoSource>)
        } else {
            None
        }
    })
}

/// Sink that records every displayed frame.
#[derive(Clone, Default)]
struct CollectSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FrameSink for CollectSink {
    fn display(&mut self, frame: &[u8]) {
        self.frames.lock().push(frame.to_vec());
    }
}

fn send_and_read(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).expect("send request");
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).expect("read reply");
    String::from_utf8_lossy(&buf[..n]).to_string()
}

fn session_id_from(reply: &str) -> u32 {
    reply
        .lines()
        .find(|line| line.starts_with("Session:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
        .expect("session id in reply")
}

#[test]
fn control_handshake_setup_play_pause_teardown() {
    const BIND: &str = "127.0.0.1:28554";

    let mut server = Server::new(BIND, scripted_factory(vec![vec![0u8; 64]]));
    server.start().expect("server start");

    let mut stream = TcpStream::connect(BIND).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    // SETUP: 200, non-zero session id
    let setup = send_and_read(
        &mut stream,
        "SETUP movie.mjpeg RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port=29000",
    );
    assert!(setup.starts_with("RTSP/1.0 200 OK"), "SETUP reply: {setup}");
    assert!(setup.contains("CSeq: 1"), "SETUP reply echoes CSeq: {setup}");
    let session_id = session_id_from(&setup);
    assert_ne!(session_id, 0, "session id must be non-zero");

    // Duplicate SETUP: silently ignored, no reply at all
    stream
        .write_all(b"SETUP movie.mjpeg RTSP/1.0\nCSeq: 2\nTransport: RTP/UDP; client_port=29000")
        .unwrap();
    let mut buf = [0u8; 64];
    assert!(
        stream.read(&mut buf).is_err(),
        "duplicate SETUP must get no reply"
    );

    // PLAY: 200, same session
    let play = send_and_read(
        &mut stream,
        &format!("PLAY movie.mjpeg RTSP/1.0\nCSeq: 3\nSession: {session_id}"),
    );
    assert!(play.starts_with("RTSP/1.0 200 OK"), "PLAY reply: {play}");
    assert_eq!(session_id_from(&play), session_id);

    // PAUSE: 200
    let pause = send_and_read(
        &mut stream,
        &format!("PAUSE movie.mjpeg RTSP/1.0\nCSeq: 4\nSession: {session_id}"),
    );
    assert!(pause.starts_with("RTSP/1.0 200 OK"), "PAUSE reply: {pause}");

    // TEARDOWN: 200
    let teardown = send_and_read(
        &mut stream,
        &format!("TEARDOWN movie.mjpeg RTSP/1.0\nCSeq: 5\nSession: {session_id}"),
    );
    assert!(
        teardown.starts_with("RTSP/1.0 200 OK"),
        "TEARDOWN reply: {teardown}"
    );

    server.stop();
}

#[test]
fn setup_for_unknown_resource_is_404() {
    const BIND: &str = "127.0.0.1:28555";

    let mut server = Server::new(BIND, scripted_factory(vec![]));
    server.start().expect("server start");

    let mut stream = TcpStream::connect(BIND).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let reply = send_and_read(
        &mut stream,
        "SETUP missing.mjpeg RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port=29001",
    );
    assert!(
        reply.starts_with("RTSP/1.0 404 Not Found"),
        "expected 404, got: {reply}"
    );

    // the connection stays in Init: a retried SETUP for a valid name
    // would still be answered (state was not consumed)
    server.stop();
}

#[test]
fn media_flows_end_to_end_through_player() {
    const BIND: &str = "127.0.0.1:28556";

    // One frame large enough to fragment (5000 bytes -> 4 datagrams) and
    // two small ones.
    let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let frames = vec![vec![1u8; 100], big.clone(), vec![2u8; 200]];

    let mut server = Server::new(BIND, scripted_factory(frames.clone()));
    server.start().expect("server start");

    let sink = CollectSink::default();
    let player = Player::connect(
        BIND,
        "movie.mjpeg",
        Box::new(sink.clone()),
        PlayerConfig::default(),
    )
    .expect("player connect");

    player.setup().expect("setup");
    wait_until(Duration::from_secs(2), || {
        player.state() == SessionState::Ready
    });
    assert_eq!(player.state(), SessionState::Ready, "SETUP not acknowledged");
    assert_ne!(player.session_id(), 0);

    player.play().expect("play");
    wait_until(Duration::from_secs(2), || {
        player.state() == SessionState::Playing
    });
    assert_eq!(player.state(), SessionState::Playing, "PLAY not acknowledged");

    // three frames at ~40ms pacing plus display cadence
    wait_until(Duration::from_secs(5), || sink.frames.lock().len() >= 3);
    let received = sink.frames.lock().clone();
    assert_eq!(received.len(), 3, "all frames should arrive over loopback");
    assert_eq!(received[0], frames[0]);
    assert_eq!(received[1], big, "fragmented frame reassembles byte-exact");
    assert_eq!(received[2], frames[2]);

    let snapshot = player.snapshot();
    assert_eq!(snapshot.loss_ratio, 0.0, "loopback stream has no gaps");

    player.teardown().expect("teardown");
    wait_until(Duration::from_secs(2), || {
        player.state() == SessionState::Init
    });
    assert_eq!(player.state(), SessionState::Init, "TEARDOWN not acknowledged");

    player.shutdown();
    server.stop();
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
