//! Transports carrying SIP messages.
//!
//! Every transport decodes incoming bytes into [`SipMessage`]s and fans
//! them out to subscriber channels. Stream based transports (TCP, TLS)
//! additionally keep a table of live peer connections which are closed
//! again after an idle timeout.

use crate::Result;
use bytes::Bytes;
use sip_types::msg::SipMessage;
use std::fmt::{Debug, Display};
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;

mod conn_table;
mod connection;
mod notifier;
mod parse;
pub mod streaming;
pub mod tcp;
pub mod udp;

#[cfg(feature = "tls-native-tls")]
pub mod native_tls;

pub use conn_table::{ConnTable, SOCKET_EXPIRY};
pub use connection::Connection;
pub use notifier::{Notifier, SUBSCRIBE_QUEUE_SIZE};

/// Largest possible UDP payload. Bounds a single read on any transport and
/// the size of a framed message.
pub const MAX_MSG_SIZE: usize = 65_507;

/// A decoded message received from a transport
#[derive(Debug, Clone)]
pub struct Incoming {
    pub message: SipMessage,

    /// Address of the peer the message was received from
    pub source: SocketAddr,

    /// The raw bytes the message was decoded from
    pub buffer: Bytes,

    /// Name of the receiving transport (taken from [`Transport::name`])
    pub transport: &'static str,

    /// Timestamp the message was received at
    pub timestamp: SystemTime,
}

/// Abstraction over a message transport
#[async_trait::async_trait]
pub trait Transport: Debug + Display + Send + Sync + 'static {
    /// Must return the name of the transport. (e.g. UDP, TCP, TLS ...)
    fn name(&self) -> &'static str;

    /// Indicates if the transport is a secure connection (e.g. TLS)
    fn secure(&self) -> bool;

    /// Stream based transports frame messages by `Content-Length`,
    /// datagram based transports by packet boundary
    fn is_streamed(&self) -> bool;

    /// Register a new subscriber channel receiving every decoded message
    fn subscribe(&self) -> mpsc::Receiver<Incoming>;

    /// Bind `addr` and serve it until [`stop`](Transport::stop) is called.
    ///
    /// Returns the bound address. May be called multiple times to listen
    /// on several endpoints.
    async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr>;

    /// Send `msg` to `target`
    async fn send(&self, target: SocketAddr, msg: &SipMessage) -> Result<()>;

    /// Close every listener and connection. Idempotent, the transport is
    /// inert afterwards.
    async fn stop(&self);
}
