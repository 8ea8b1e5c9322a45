use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::net::PacingControl;
use crate::protocol::{MethodHandler, RtspRequest};
use crate::server::{SenderConfig, SourceFactory};
use crate::stats::SendMonitor;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::Server::stop`] can terminate it promptly.
pub fn accept_loop(
    listener: TcpListener,
    factory: SourceFactory,
    config: Arc<SenderConfig>,
    pacing: PacingControl,
    monitor: Arc<SendMonitor>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let f = factory.clone();
                let c = config.clone();
                let p = pacing.clone();
                let m = monitor.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, f, c, p, m, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single control connection with its own session lifecycle.
struct Connection {
    stream: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(
        stream: TcpStream,
        factory: SourceFactory,
        config: Arc<SenderConfig>,
        pacing: PacingControl,
        monitor: Arc<SendMonitor>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let handler = MethodHandler::new(factory, peer_addr.ip(), config, pacing, monitor);
        let mut conn = Connection {
            stream,
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.handler.shutdown();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Control request/reply loop. Returns the reason for exiting.
    ///
    /// Requests arrive as one newline-separated message per datagram-sized
    /// read; there is no pipelining on this channel.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        let mut buf = [0u8; 1024];
        while running.load(Ordering::SeqCst) {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return "connection closed by client",
                Ok(n) => n,
                Err(_) => return "read error",
            };

            let text = String::from_utf8_lossy(&buf[..n]);
            if text.trim().is_empty() {
                continue;
            }

            match RtspRequest::parse(&text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        resource = %request.resource,
                        cseq = request.cseq,
                        "request"
                    );

                    // None means the request did not match the session
                    // state and is ignored without a reply.
                    if let Some(response) = self.handler.handle(&request) {
                        tracing::debug!(
                            peer = %self.peer_addr,
                            status = response.status.code(),
                            cseq = response.cseq,
                            "reply"
                        );
                        if self
                            .stream
                            .write_all(response.serialize().as_bytes())
                            .is_err()
                        {
                            return "write error";
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "request parse error");
                }
            }
        }

        "server shutting down"
    }
}
