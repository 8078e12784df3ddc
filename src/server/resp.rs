//! RESP wire codec.
//!
//! Requests arrive as RESP arrays of bulk strings (`*2\r\n$3\r\nGET\r\n...`);
//! a bare line without the `*` prefix is treated as an inline command and
//! split on whitespace, which keeps `telnet` sessions usable. Replies cover
//! the five classic RESP types plus the null bulk string.
//!
//! The parser is incremental: it never consumes bytes from the buffer until
//! a complete command is available, so a connection task can keep appending
//! reads and retrying.

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

/// One outgoing RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }
}

/// Malformed RESP input; the connection is closed after reporting it.
#[derive(Debug)]
pub struct ProtocolError(String);

impl ProtocolError {
    fn new(message: impl Into<String>) -> Self {
        ProtocolError(message.into())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// Index of the `\r` of the next CRLF at or after `from`, if present.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|pair| pair == b"\r\n")
        .map(|offset| from + offset)
}

fn parse_decimal(digits: &[u8]) -> Result<i64, ProtocolError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::new("invalid length prefix"))
}

/// Decodes one command from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds only a prefix of a command;
/// nothing is consumed in that case. On success the command's bytes are
/// consumed and its arguments returned (possibly empty, for a blank inline
/// line; callers should just skip those).
pub fn parse_command(buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != b'*' {
        // Inline command: one whitespace-separated line.
        let Some(end) = find_crlf(buf, 0) else {
            return Ok(None);
        };
        let args = buf[..end]
            .split(|byte| byte.is_ascii_whitespace())
            .filter(|part| !part.is_empty())
            .map(Bytes::copy_from_slice)
            .collect();
        buf.advance(end + 2);
        return Ok(Some(args));
    }

    let Some(header_end) = find_crlf(buf, 1) else {
        return Ok(None);
    };
    let argument_count = parse_decimal(&buf[1..header_end])?;
    if argument_count < 0 {
        return Err(ProtocolError::new("negative multibulk length"));
    }

    let mut cursor = header_end + 2;
    let mut args = Vec::with_capacity(argument_count as usize);
    for _ in 0..argument_count {
        if cursor >= buf.len() {
            return Ok(None);
        }
        if buf[cursor] != b'$' {
            return Err(ProtocolError::new("expected bulk string"));
        }
        let Some(length_end) = find_crlf(buf, cursor + 1) else {
            return Ok(None);
        };
        let length = parse_decimal(&buf[cursor + 1..length_end])?;
        if length < 0 {
            return Err(ProtocolError::new("negative bulk length"));
        }
        let payload_start = length_end + 2;
        let payload_end = payload_start + length as usize;
        if buf.len() < payload_end + 2 {
            return Ok(None);
        }
        if &buf[payload_end..payload_end + 2] != b"\r\n" {
            return Err(ProtocolError::new("bulk string missing terminator"));
        }
        args.push(Bytes::copy_from_slice(&buf[payload_start..payload_end]));
        cursor = payload_end + 2;
    }
    buf.advance(cursor);
    Ok(Some(args))
}

/// Appends the RESP encoding of `reply` to `dst`.
pub fn write_reply(dst: &mut BytesMut, reply: &Reply) {
    match reply {
        Reply::Simple(text) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(text.as_bytes());
            dst.extend_from_slice(b"\r\n");
        },
        Reply::Error(message) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(message.as_bytes());
            dst.extend_from_slice(b"\r\n");
        },
        Reply::Integer(value) => {
            dst.extend_from_slice(b":");
            dst.extend_from_slice(value.to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
        },
        Reply::Bulk(payload) => {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(payload.len().to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
            dst.extend_from_slice(payload);
            dst.extend_from_slice(b"\r\n");
        },
        Reply::Null => dst.extend_from_slice(b"$-1\r\n"),
        Reply::Array(items) => {
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(items.len().to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
            for item in items {
                write_reply(dst, item);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(reply: &Reply) -> Vec<u8> {
        let mut dst = BytesMut::new();
        write_reply(&mut dst, reply);
        dst.to_vec()
    }

    #[test]
    fn parses_a_complete_array_command() {
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"[..]);
        let args = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![&b"SET"[..], &b"key"[..], &b"value"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_input_consumes_nothing() {
        let full = b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n";
        for cut in 1..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(parse_command(&mut buf).unwrap().is_none(), "cut at {cut}");
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn pipelined_commands_parse_one_at_a_time() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n"[..]);
        assert!(parse_command(&mut buf).unwrap().is_some());
        assert!(parse_command(&mut buf).unwrap().is_some());
        assert!(parse_command(&mut buf).unwrap().is_none());
    }

    #[test]
    fn inline_commands_split_on_whitespace() {
        let mut buf = BytesMut::from(&b"GET mykey\r\n"[..]);
        let args = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![&b"GET"[..], &b"mykey"[..]]);
    }

    #[test]
    fn blank_inline_line_yields_no_arguments() {
        let mut buf = BytesMut::from(&b"\r\nPING\r\n"[..]);
        assert!(parse_command(&mut buf).unwrap().unwrap().is_empty());
        let args = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![&b"PING"[..]]);
    }

    #[test]
    fn binary_payloads_survive_parsing() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\n\x00\xff\r\r\n"[..]);
        let args = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(args[1], &b"\x00\xff\r"[..]);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let mut buf = BytesMut::from(&b"*1\r\n+oops\r\n"[..]);
        assert!(parse_command(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*x\r\n"[..]);
        assert!(parse_command(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*-1\r\n"[..]);
        assert!(parse_command(&mut buf).is_err());
    }

    #[test]
    fn replies_encode_to_their_wire_forms() {
        assert_eq!(encoded(&Reply::ok()), b"+OK\r\n");
        assert_eq!(encoded(&Reply::Error("ERR nope".into())), b"-ERR nope\r\n");
        assert_eq!(encoded(&Reply::Integer(-2)), b":-2\r\n");
        assert_eq!(
            encoded(&Reply::Bulk(Bytes::from_static(b"hi"))),
            b"$2\r\nhi\r\n"
        );
        assert_eq!(encoded(&Reply::Null), b"$-1\r\n");
        assert_eq!(
            encoded(&Reply::Array(vec![
                Reply::Bulk(Bytes::from_static(b"0")),
                Reply::Array(vec![Reply::Null]),
            ])),
            b"*2\r\n$1\r\n0\r\n*1\r\n$-1\r\n"
        );
    }
}
