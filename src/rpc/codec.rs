// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited JSON framing.
//!
//! Inbound, the codec yields one [`Frame`] per line. A line longer than the
//! frame limit is skipped up to its terminating newline and reported as
//! [`Frame::Oversized`], so one bad client line never ends the stream.
//! Outbound, each [`Response`] is written as a single line.

use std::{cmp, io};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use warden_core::protocol::Response;

/// Longest accepted request line, excluding the newline
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One line, without its `\n` or `\r\n` terminator
    Line(Bytes),
    /// A line that exceeded the limit and was dropped
    Oversized,
}

#[derive(Debug)]
pub struct JsonLineCodec {
    max_length: usize,
    /// Where the next newline scan resumes
    next_index: usize,
    /// Inside an oversized line, dropping bytes until its newline
    discarding: bool,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut, len: usize, consumed: usize) -> Frame {
        let mut line = buf.split_to(consumed);
        line.truncate(len);
        if line.last() == Some(&b'\r') {
            line.truncate(len - 1);
        }
        self.next_index = 0;
        Frame::Line(line.freeze())
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            // Never scan further than one byte past the limit
            let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    buf.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                    return Ok(Some(Frame::Oversized));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let len = self.next_index + offset;
                    return Ok(Some(self.take_line(buf, len, len + 1)));
                }
                (false, None) if buf.len() > self.max_length => {
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        if self.discarding {
            buf.clear();
            self.discarding = false;
            self.next_index = 0;
            return Ok(Some(Frame::Oversized));
        }

        if buf.is_empty() {
            return Ok(None);
        }

        // Final line without a trailing newline
        let len = buf.len();
        Ok(Some(self.take_line(buf, len, len)))
    }
}

impl Encoder<Response> for JsonLineCodec {
    type Error = io::Error;

    fn encode(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), io::Error> {
        let line = serde_json::to_vec(&response)?;
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(&line);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> Option<Frame> {
        Some(Frame::Line(Bytes::copy_from_slice(s.as_bytes())))
    }

    #[test]
    fn splits_lines_and_strips_carriage_return() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from("{\"a\":1}\r\n{\"b\":2}\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"a\":1}"));
        assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"b\":2}"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn buffers_partial_line_until_newline() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from("{\"method\":");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\"ping\"}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), line("{\"method\":\"ping\"}"));
    }

    #[test]
    fn oversized_line_is_dropped_and_stream_continues() {
        let mut codec = JsonLineCodec::with_max_length(8);
        let mut buf = BytesMut::from("0123456789abcdef");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"tail\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Oversized));
        assert_eq!(codec.decode(&mut buf).unwrap(), line("ok"));
    }

    #[test]
    fn line_at_exact_limit_is_accepted() {
        let mut codec = JsonLineCodec::with_max_length(4);
        let mut buf = BytesMut::from("abcd\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), line("abcd"));
    }

    #[test]
    fn eof_flushes_unterminated_line() {
        let mut codec = JsonLineCodec::new();
        let mut buf = BytesMut::from("last");
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), line("last"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encodes_one_line_per_response() {
        let mut codec = JsonLineCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(Response::success("1", serde_json::json!({"status": "ok"})), &mut dst)
            .unwrap();

        assert_eq!(
            &dst[..],
            b"{\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"status\":\"ok\"}}\n"
        );
    }
}
