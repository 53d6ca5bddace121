//! Decoding of complete datagrams.
//!
//! Unlike stream based transports a datagram carries exactly one message
//! and the body simply runs to the end of the packet, `Content-Length` is
//! not used for framing.

use super::streaming::decode::{DecodeError, DecodedMessage, parse_head};
use bytes::Bytes;
use sip_types::msg::SipMessage;

pub(crate) fn parse_datagram(buffer: Bytes) -> Result<Option<DecodedMessage>, DecodeError> {
    let whitespace_count = buffer
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();

    let buffer = buffer.slice(whitespace_count..);

    if buffer.is_empty() {
        // keep-alive or empty datagram
        return Ok(None);
    }

    let Some(head_end) = memchr::memmem::find(&buffer, b"\r\n\r\n") else {
        return Err(DecodeError::Malformed);
    };

    let (line, headers) = parse_head(&buffer, head_end)?;
    let body = buffer.slice(head_end + 4..);

    Ok(Some(DecodedMessage {
        message: SipMessage::new(line, headers, body),
        buffer,
    }))
}
