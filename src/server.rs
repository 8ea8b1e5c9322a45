use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StreamError};
use crate::media::{Fragmenter, VideoSource};
use crate::media::fragment::{DEFAULT_HEADER_OVERHEAD, DEFAULT_MTU, PAYLOAD_TYPE_MJPEG};
use crate::net::PacingControl;
use crate::stats::{SendMonitor, SendReport};
use crate::transport::{UdpTransport, tcp};

/// Resolves a resource name from a SETUP request to a video source.
/// Returning `None` makes SETUP answer 404.
pub type SourceFactory = Arc<dyn Fn(&str) -> Option<Box<dyn VideoSource>> + Send + Sync>;

/// Media send-path configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Payload type stamped on every media packet.
    pub payload_type: u8,
    pub mtu: usize,
    /// Bytes subtracted from the MTU before chunking.
    pub header_overhead: usize,
    /// Extra send attempts per datagram before declaring it lost.
    pub send_retries: u32,
    /// Inter-frame delay for ordinary frames.
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Frame sizes above these get the scaled delays below.
    pub large_frame_bytes: usize,
    pub medium_frame_bytes: usize,
    pub large_frame_factor: f64,
    pub medium_frame_factor: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            payload_type: PAYLOAD_TYPE_MJPEG,
            mtu: DEFAULT_MTU,
            header_overhead: DEFAULT_HEADER_OVERHEAD,
            send_retries: 2,
            base_delay: Duration::from_millis(40),
            min_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            large_frame_bytes: 100_000,
            medium_frame_bytes: 50_000,
            large_frame_factor: 1.5,
            medium_frame_factor: 1.2,
        }
    }
}

/// Inter-frame delay scaled by the size of the frame just sent, clamped to
/// the configured range. Used when no pacing override is set.
fn frame_delay(frame_len: usize, config: &SenderConfig) -> Duration {
    let base = config.base_delay.as_secs_f64();
    let scaled = if frame_len > config.large_frame_bytes {
        base * config.large_frame_factor
    } else if frame_len > config.medium_frame_bytes {
        base * config.medium_frame_factor
    } else {
        base
    };
    Duration::from_secs_f64(
        scaled.clamp(config.min_delay.as_secs_f64(), config.max_delay.as_secs_f64()),
    )
}

/// One session's media send path: a thread reading the video source,
/// fragmenting frames, and sending datagrams until stopped or exhausted.
///
/// The stop flag is the only coupling back to the control side; PAUSE and
/// TEARDOWN set it and the loop exits at its next check.
pub struct MediaSender {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MediaSender {
    pub fn start(
        source: Arc<Mutex<Box<dyn VideoSource>>>,
        fragmenter: Arc<Mutex<Fragmenter>>,
        dest: SocketAddr,
        config: Arc<SenderConfig>,
        pacing: PacingControl,
        monitor: Arc<SendMonitor>,
    ) -> Result<Self> {
        let udp = UdpTransport::bind()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::spawn(move || {
            tracing::debug!(%dest, "media send path started");
            let mut delay = config.base_delay;
            loop {
                thread::sleep(delay);
                if thread_stop.load(Ordering::SeqCst) {
                    break;
                }

                let frame = source.lock().next_frame();
                let Some(frame) = frame else {
                    tracing::info!(%dest, "video source exhausted, send path ending");
                    break;
                };
                let frame_id = source.lock().frame_number();

                let packets = fragmenter.lock().packetize(frame_id, &frame);
                for packet in &packets {
                    if send_with_retry(&udp, packet, dest, config.send_retries) {
                        monitor.record(packet.len());
                    }
                }

                tracing::trace!(frame_id, frame_bytes = frame.len(), datagrams = packets.len(), "frame sent");
                delay = pacing.get().unwrap_or_else(|| frame_delay(frame.len(), &config));
            }
            tracing::debug!(%dest, "media send path exited");
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the send loop to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MediaSender {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bounded retry for one datagram. Media is best-effort: exhausting the
/// retries logs the loss and moves on, it never aborts the stream.
fn send_with_retry(udp: &UdpTransport, packet: &[u8], dest: SocketAddr, retries: u32) -> bool {
    for attempt in 0..=retries {
        match udp.send_to(packet, dest) {
            Ok(_) => return true,
            Err(e) => {
                tracing::warn!(%dest, attempt, error = %e, "media send failed");
            }
        }
    }
    tracing::warn!(%dest, retries, "media packet dropped after retries");
    false
}

/// Responder-side server: accepts control connections and gives each one
/// its own handler thread and session.
pub struct Server {
    bind_addr: String,
    factory: SourceFactory,
    config: Arc<SenderConfig>,
    pacing: PacingControl,
    monitor: Arc<SendMonitor>,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(bind_addr: &str, factory: SourceFactory) -> Self {
        Self::with_config(bind_addr, factory, SenderConfig::default())
    }

    pub fn with_config(bind_addr: &str, factory: SourceFactory, config: SenderConfig) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            factory,
            config: Arc::new(config),
            pacing: PacingControl::new(),
            monitor: Arc::new(SendMonitor::new()),
            running: Arc::new(AtomicBool::new(false)),
            accept_handle: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(addr = %self.bind_addr, "control server listening");

        let factory = self.factory.clone();
        let config = self.config.clone();
        let pacing = self.pacing.clone();
        let monitor = self.monitor.clone();
        let running = self.running.clone();

        self.accept_handle = Some(thread::spawn(move || {
            tcp::accept_loop(listener, factory, config, pacing, monitor, running);
        }));

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        tracing::info!("server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pacing override handle for the adaptive feedback integration point.
    pub fn pacing(&self) -> PacingControl {
        self.pacing.clone()
    }

    /// Cumulative send statistics across all sessions.
    pub fn send_report(&self) -> SendReport {
        self.monitor.snapshot()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_delay_scales_with_size() {
        let config = SenderConfig::default();
        assert_eq!(frame_delay(10_000, &config), Duration::from_millis(40));
        assert_eq!(frame_delay(60_000, &config), Duration::from_millis(48));
        assert_eq!(frame_delay(150_000, &config), Duration::from_millis(60));
    }

    #[test]
    fn frame_delay_clamped() {
        let config = SenderConfig {
            base_delay: Duration::from_millis(90),
            ..SenderConfig::default()
        };
        // 90ms * 1.5 = 135ms, clamped to max 100ms
        assert_eq!(frame_delay(150_000, &config), Duration::from_millis(100));
    }

    #[test]
    fn start_twice_is_an_error() {
        let factory = test_support::counting_factory(&["movie.mjpeg"]);
        let mut server = Server::new("127.0.0.1:0", factory);
        server.start().unwrap();
        assert!(matches!(server.start(), Err(StreamError::AlreadyRunning)));
        server.stop();
        assert!(!server.is_running());
    }
}
