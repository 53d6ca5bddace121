//! Core part of the skein SIP stack
//!
//! Implements the transport layer: UDP, TCP and TLS transports behind a
//! uniform [`Transport`](transport::Transport) interface, per-peer
//! connection lifetime management with idle expiry and fan-out of decoded
//! messages to any number of subscriber channels.
//!
//! URI and message types live in the `skein-sip-types` crate.

mod error;
pub mod transport;

pub use error::{Error, Result};
