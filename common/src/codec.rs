//! Decoding wire bytes into [`Message`]s.
//!
//! A message is read as a frame: every line up to the first empty one. The
//! first line is matched against [`DECODERS`] by prefix, and the matching
//! decoder validates the whole frame.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::message::*;
use crate::WordCounts;

/// Longest line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Most lines accepted in one message, the terminating blank line excluded.
pub const MAX_FRAME_LINES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes do not follow the grammar of any message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The underlying stream failed while reading.
    #[error("failed to read message: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_))
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed(reason.into())
}

type Decoder = fn(&[String]) -> Result<Message, ProtocolError>;

/// Prefix to decoder. The first matching prefix wins.
pub const DECODERS: &[(&str, Decoder)] = &[
    (FETCH_PREFIX, decode_fetch_request),
    (WORK_REQUEST_PREFIX, decode_work_request),
    (WORK_ASSIGNMENT_PREFIX, decode_work_assignment),
    (RESULT_REPORT_PREFIX, decode_result_report),
    (RESULT_ACK_PREFIX, decode_result_ack),
];

impl Message {
    /// Read exactly one message from `reader`.
    ///
    /// Bytes after the terminating blank line are left unread.
    pub async fn decode<R>(reader: &mut R) -> Result<Message, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
    {
        let frame = read_frame(reader).await?;
        decode_frame(&frame)
    }
}

/// Decode an already-split frame (line terminators removed, no blank line).
pub fn decode_frame(lines: &[String]) -> Result<Message, ProtocolError> {
    let first = lines.first().ok_or_else(|| malformed("empty message"))?;

    let decoder = DECODERS
        .iter()
        .find(|(prefix, _)| first.starts_with(prefix))
        .map(|(_, decoder)| decoder)
        .ok_or_else(|| malformed(format!("unknown message type in {first:?}")))?;

    decoder(lines)
}

/// Read lines up to and including the first empty line.
async fn read_frame<R>(reader: &mut R) -> Result<Vec<String>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut raw = Vec::with_capacity(128);

    loop {
        raw.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut raw)
            .await?;

        if n == 0 {
            return Err(malformed(if lines.is_empty() {
                "stream ended before any message"
            } else {
                "stream ended before the terminating blank line"
            }));
        }
        if raw.last() != Some(&b'\n') {
            return Err(malformed(if n >= MAX_LINE_LEN {
                "line too long"
            } else {
                "stream ended mid-line"
            }));
        }

        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if raw.is_empty() {
            return Ok(lines);
        }
        if lines.len() == MAX_FRAME_LINES {
            return Err(malformed("too many lines"));
        }

        let line = std::str::from_utf8(&raw).map_err(|_| malformed("line is not valid UTF-8"))?;
        lines.push(line.to_owned());
    }
}

/// Parse `<label> <value>`. A missing value reads as empty.
fn field<'a>(line: &'a str, label: &str) -> Result<&'a str, ProtocolError> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(name), value, None) if name == label => Ok(value.unwrap_or("")),
        _ => Err(malformed(format!("expected `{label} <value>`, got {line:?}"))),
    }
}

/// Check that `lines` holds exactly `expected` lines.
fn line_count(lines: &[String], expected: usize, kind: &str) -> Result<(), ProtocolError> {
    if lines.len() != expected {
        return Err(malformed(format!(
            "{kind} has {} lines, expected {expected}",
            lines.len()
        )));
    }
    Ok(())
}

/// Check a first line that carries nothing but the keyword.
fn keyword(line: &str, expected: &str) -> Result<(), ProtocolError> {
    if line != expected {
        return Err(malformed(format!("expected `{expected}`, got {line:?}")));
    }
    Ok(())
}

fn decode_fetch_request(lines: &[String]) -> Result<Message, ProtocolError> {
    line_count(lines, 2, "FetchRequest")?;

    let tokens: Vec<&str> = lines[0].split_whitespace().collect();
    let path = match tokens.as_slice() {
        ["GET", path, version] if *version == HTTP_VERSION => *path,
        _ => return Err(malformed(format!("bad request line {:?}", lines[0]))),
    };
    let host = field(&lines[1], HOST_LABEL)?;

    Ok(Message::Fetch(FetchRequest::new(host, path)?))
}

fn decode_work_request(lines: &[String]) -> Result<Message, ProtocolError> {
    line_count(lines, 1, "WorkRequest")?;
    keyword(&lines[0], WORK_REQUEST_PREFIX)?;
    Ok(Message::WorkRequest)
}

fn decode_work_assignment(lines: &[String]) -> Result<Message, ProtocolError> {
    line_count(lines, 3, "WorkAssignment")?;
    keyword(&lines[0], WORK_ASSIGNMENT_PREFIX)?;

    let host = field(&lines[1], HOST_LABEL)?;
    let path = field(&lines[2], PATH_LABEL)?;

    Ok(Message::WorkAssignment(WorkAssignment::new(host, path)?))
}

fn decode_result_report(lines: &[String]) -> Result<Message, ProtocolError> {
    if lines.len() < 3 {
        return Err(malformed("ResultReport is missing its header lines"));
    }
    keyword(&lines[0], RESULT_REPORT_PREFIX)?;
    let path = field(&lines[1], PATH_LABEL)?;
    keyword(&lines[2], WORD_COUNTS_LABEL)?;

    let mut counts = WordCounts::default();
    for line in &lines[3..] {
        let mut tokens = line.split_whitespace();
        let (word, count) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(word), Some(count), None) => (word, count),
            _ => return Err(malformed(format!("expected `<word> <count>`, got {line:?}"))),
        };
        let count: u64 = count
            .parse()
            .map_err(|_| malformed(format!("count for {word:?} is not a number: {count:?}")))?;
        if counts.insert(word.to_owned(), count).is_some() {
            return Err(malformed(format!("word {word:?} reported twice")));
        }
    }

    Ok(Message::ResultReport(ResultReport::new(path, counts)?))
}

fn decode_result_ack(lines: &[String]) -> Result<Message, ProtocolError> {
    line_count(lines, 1, "ResultAck")?;
    keyword(&lines[0], RESULT_ACK_PREFIX)?;
    Ok(Message::ResultAck)
}
