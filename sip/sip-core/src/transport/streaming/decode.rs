use crate::transport::MAX_MSG_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use bytesstr::BytesStr;
use sip_types::msg::{Headers, SipMessage};
use std::io;
use std::str::from_utf8;
use tokio_util::codec::Decoder;

#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("received message too large")]
    MessageTooLarge,
    #[error("received message is malformed")]
    Malformed,
}

pub(crate) struct DecodedMessage {
    pub message: SipMessage,

    /// The raw bytes `message` was decoded from
    pub buffer: Bytes,
}

/// Decoder for stream based transports, framing messages by their
/// `Content-Length` header.
#[derive(Default)]
pub(crate) struct StreamingDecoder {
    /// Bytes scanned for the end of the message head so far
    head_progress: usize,
}

impl Decoder for StreamingDecoder {
    type Item = DecodedMessage;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // strip newlines between messages
        let whitespace_count = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if whitespace_count > 0 {
            src.advance(whitespace_count);
            self.head_progress = 0;
        }

        if src.is_empty() {
            return Ok(None);
        }

        // limit message size
        if src.len() > MAX_MSG_SIZE {
            src.clear();
            self.head_progress = 0;

            return Err(DecodeError::MessageTooLarge);
        }

        // look for the blank line ending the message head, continuing
        // where the previous call left off
        let search_from = self.head_progress.saturating_sub(3);

        let Some(found) = memchr::memmem::find(&src[search_from..], b"\r\n\r\n") else {
            // message head not complete yet
            self.head_progress = src.len();
            return Ok(None);
        };

        let head_end = search_from + found;
        let body_start = head_end + 4;

        // first pass over the head, only to learn the expected body length
        let content_len = scan_content_length(&src[..head_end])?;

        let expected_complete_message_size = body_start + content_len;

        if expected_complete_message_size > MAX_MSG_SIZE {
            src.clear();
            self.head_progress = 0;

            return Err(DecodeError::MessageTooLarge);
        }

        // if the body is not completely inside the buffer yet, allocate
        // the rest and wait for more data
        if src.len() < expected_complete_message_size {
            src.reserve(expected_complete_message_size - src.len());
            self.head_progress = head_end;
            return Ok(None);
        }

        // detach all bytes belonging to the current message
        let buffer = src.split_to(expected_complete_message_size).freeze();
        self.head_progress = 0;

        let (line, headers) = parse_head(&buffer, head_end)?;
        let body = buffer.slice(body_start..);

        Ok(Some(DecodedMessage {
            message: SipMessage::new(line, headers, body),
            buffer,
        }))
    }
}

fn scan_content_length(head: &[u8]) -> Result<usize, DecodeError> {
    let head = from_utf8(head).map_err(|_| DecodeError::Malformed)?;

    for line in head.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };

        let name = name.trim_matches([' ', '\t']);

        // the compact form of Content-Length is `l`
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("l") {
            return value
                .trim_matches([' ', '\t'])
                .parse()
                .map_err(|_| DecodeError::Malformed);
        }
    }

    Ok(0)
}

/// Parse `buffer[..head_end]` into the leading line and raw headers.
///
/// `head_end` must lie before the blank line terminating the head.
pub(crate) fn parse_head(buffer: &Bytes, head_end: usize) -> Result<(BytesStr, Headers), DecodeError> {
    let head = from_utf8(&buffer[..head_end]).map_err(|_| DecodeError::Malformed)?;

    let mut lines = head.split("\r\n");

    let line = lines.next().unwrap_or_default();
    if line.is_empty() {
        return Err(DecodeError::Malformed);
    }

    let mut headers = Headers::new();

    for header in lines {
        match header.split_once(':') {
            Some((name, value)) if !name.trim_matches([' ', '\t']).is_empty() => headers.push(
                BytesStr::from_parse(buffer, name.trim_matches([' ', '\t'])),
                BytesStr::from_parse(buffer, value.trim_matches([' ', '\t'])),
            ),
            _ => {
                log::error!("incoming SIP message has malformed header line {header:?}");
            }
        }
    }

    Ok((BytesStr::from_parse(buffer, line), headers))
}
