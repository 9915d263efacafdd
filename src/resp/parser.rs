// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Incremental decoder over arbitrary byte fragments (spec §4.1).
//!
//! `ParserState` holds only the bytes of the top-level value currently
//! in progress. A fragment is appended to that buffer and one recursive
//! decode pass is attempted; if the buffer doesn't yet hold a complete
//! value the bytes are kept for the next call, which is exactly the
//! "in-progress" / "idle" split spec §3 describes — `idle` is simply an
//! empty buffer.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::resp::value::{Reply, ReplyCode};

/// Continuation state carried between `parse` calls.
#[derive(Debug, Default, Clone)]
pub struct ParserState {
    buf: BytesMut,
}

impl ParserState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.buf.is_empty()
    }
}

/// A malformed line in the wire stream. Unlike a server `Error` reply
/// (a valid RESP value), this means the bytes didn't follow the grammar
/// at all and the connection should be treated as corrupt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown type tag: {0:#x}")]
    UnknownTag(u8),
    #[error("malformed integer line")]
    BadInteger,
    #[error("negative bulk length other than -1: {0}")]
    BadBulkLength(i64),
    #[error("negative array length other than -1: {0}")]
    BadArrayLength(i64),
}

/// The result of one `parse` call.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete top-level value was decoded. `leftover` holds any
    /// bytes after it (empty if the fragment's tail was fully
    /// consumed) — re-enter `parse(state, leftover)` until `Continue`.
    Value {
        reply: Reply,
        code: ReplyCode,
        leftover: Bytes,
        state: ParserState,
    },
    /// The fragment was insufficient to complete a value; `state` now
    /// carries the continuation.
    Continue(ParserState),
}

/// Feed `fragment` to the parser. See module docs for the contract.
pub fn parse(mut state: ParserState, fragment: &[u8]) -> Result<ParseOutcome, ParseError> {
    state.buf.extend_from_slice(fragment);

    match decode_value(&state.buf)? {
        None => Ok(ParseOutcome::Continue(state)),
        Some((reply, consumed)) => {
            let code = reply.code();
            let leftover = state.buf.split_off(consumed).freeze();
            Ok(ParseOutcome::Value {
                reply,
                code,
                leftover,
                state: ParserState::idle(),
            })
        },
    }
}

/// Try to decode exactly one top-level value from the front of `buf`.
/// Returns `Ok(None)` when more bytes are needed.
fn decode_value(buf: &[u8]) -> Result<Option<(Reply, usize)>, ParseError> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };

    match tag {
        b'+' => Ok(decode_line(buf, 1)?.map(|(line, len)| (Reply::SimpleString(line), len))),
        b'-' => Ok(decode_line(buf, 1)?.map(|(line, len)| (Reply::Error(line), len))),
        b':' => decode_integer(buf),
        b'$' => decode_bulk(buf),
        b'*' => decode_array(buf),
        other => Err(ParseError::UnknownTag(other)),
    }
}

/// Scan for the CRLF terminating the line starting at `start`. Returns
/// the line bytes (excluding CRLF) and the total length of `tag + line
/// + CRLF`. `Ok(None)` means the terminator hasn't arrived yet — a
/// partial value is never consumed without it.
fn decode_line(buf: &[u8], start: usize) -> Result<Option<(Bytes, usize)>, ParseError> {
    let Some(rel) = find_crlf(&buf[start..]) else {
        return Ok(None);
    };
    let end = start + rel;
    let line = Bytes::copy_from_slice(&buf[start..end]);
    Ok(Some((line, end + 2)))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_i64(line: &[u8]) -> Result<i64, ParseError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ParseError::BadInteger)
}

fn decode_integer(buf: &[u8]) -> Result<Option<(Reply, usize)>, ParseError> {
    let Some((line, total)) = decode_line(buf, 1)? else {
        return Ok(None);
    };
    Ok(Some((Reply::Integer(parse_i64(&line)?), total)))
}

fn decode_bulk(buf: &[u8]) -> Result<Option<(Reply, usize)>, ParseError> {
    let Some((len_line, prefix_len)) = decode_line(buf, 1)? else {
        return Ok(None);
    };
    let len = parse_i64(&len_line)?;

    if len == -1 {
        return Ok(Some((Reply::Nil, prefix_len)));
    }
    if len < -1 {
        return Err(ParseError::BadBulkLength(len));
    }
    let len = len as usize;
    let needed = prefix_len + len + 2;
    if buf.len() < needed {
        return Ok(None);
    }
    let payload = Bytes::copy_from_slice(&buf[prefix_len..prefix_len + len]);
    Ok(Some((Reply::BulkString(payload), needed)))
}

fn decode_array(buf: &[u8]) -> Result<Option<(Reply, usize)>, ParseError> {
    let Some((count_line, prefix_len)) = decode_line(buf, 1)? else {
        return Ok(None);
    };
    let count = parse_i64(&count_line)?;

    if count == -1 {
        return Ok(Some((Reply::NilArray, prefix_len)));
    }
    if count < -1 {
        return Err(ParseError::BadArrayLength(count));
    }
    let count = count as usize;

    let mut elements = Vec::with_capacity(count.min(1024));
    let mut offset = prefix_len;
    for _ in 0..count {
        match decode_value(&buf[offset..])? {
            None => return Ok(None),
            Some((element, consumed)) => {
                elements.push(element);
                offset += consumed;
            },
        }
    }
    Ok(Some((Reply::Array(elements), offset)))
}
