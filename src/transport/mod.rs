//! Network transport for control signaling and media delivery.
//!
//! The transport model is split:
//!
//! - **TCP** ([`tcp`]): carries control request/reply signaling. One TCP
//!   connection per client, with a thread per connection that exclusively
//!   owns the connection's session.
//!
//! - **UDP** ([`udp`]): carries media datagrams, best-effort. The sender
//!   uses one ephemeral socket per media send path; the receiver binds the
//!   port it advertised during SETUP with a bounded read timeout so it can
//!   periodically re-check termination flags.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
