use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// UDP transport for outbound media datagrams.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`). This layer is
/// deliberately address-only — it knows nothing about sessions; the
/// caller resolves session state to socket addresses first.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound media.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }
}

/// Bind the media receive socket on the given port with a bounded read
/// timeout, so receive loops wake up to observe stop flags even when the
/// stream goes quiet.
pub fn bind_receiver(port: u16, timeout: Duration) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    socket.set_read_timeout(Some(timeout))?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_reaches_receiver() {
        let receiver = bind_receiver(0, Duration::from_millis(500)).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let sender = UdpTransport::bind().unwrap();
        let dest: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        sender.send_to(b"ping", dest).unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ping");
    }

    #[test]
    fn receiver_read_times_out() {
        let receiver = bind_receiver(0, Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 16];
        assert!(receiver.recv_from(&mut buf).is_err());
    }
}
