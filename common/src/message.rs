//! Application messages exchanged between the coordinator, its workers and
//! the document host.
//!
//! Every message is ASCII, one field per CRLF-terminated line, and ends with a
//! single empty line. The leading token of the first line names the variant:
//!
//! ```text
//! GET <path> HTTP/1.1      ReqW      AsgW            SubW             AckW
//! Host: <host>                       Host: <host>    Path: <path>
//!                                    Path: <path>    Word-Counts:
//!                                                    <word> <count>
//!                                                    ...
//! ```
//!
//! Constructors only accept values that survive the wire unchanged, so
//! `encode` never fails and its output always decodes back to the same
//! message. Encoding lives here; decoding lives in [`crate::codec`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::ProtocolError;
use crate::{rank, WordCounts};

pub const FETCH_PREFIX: &str = "GET ";
pub const WORK_REQUEST_PREFIX: &str = "ReqW";
pub const WORK_ASSIGNMENT_PREFIX: &str = "AsgW";
pub const RESULT_REPORT_PREFIX: &str = "SubW";
pub const RESULT_ACK_PREFIX: &str = "AckW";

pub const HOST_LABEL: &str = "Host:";
pub const PATH_LABEL: &str = "Path:";
pub const WORD_COUNTS_LABEL: &str = "Word-Counts:";
pub const HTTP_VERSION: &str = "HTTP/1.1";

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Check that `value` is a single wire token: no whitespace, and non-empty
/// unless `allow_empty`.
fn token(value: String, what: &str, allow_empty: bool) -> Result<String, ProtocolError> {
    if value.chars().any(char::is_whitespace) {
        return Err(ProtocolError::Malformed(format!("{what} {value:?} contains whitespace")));
    }
    if value.is_empty() && !allow_empty {
        return Err(ProtocolError::Malformed(format!("{what} is empty")));
    }
    Ok(value)
}

/// A plain GET for a document on the download host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    host: String,
    path: String,
}

impl FetchRequest {
    /// Fails unless both fields are single tokens and `path` is non-empty.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            host: token(host.into(), "host", true)?,
            path: token(path.into(), "path", false)?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The secured URL this request addresses.
    pub fn https_url(&self) -> String {
        format!("https://{}{}", self.host, self.path)
    }
}

/// The coordinator's answer to a work request.
///
/// An assignment with an empty host or path tells the worker there is no
/// work left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkAssignment {
    host: String,
    path: String,
}

impl WorkAssignment {
    /// Fails unless both fields are single tokens. Either may be empty.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            host: token(host.into(), "host", true)?,
            path: token(path.into(), "path", true)?,
        })
    }

    /// The "no work left" sentinel.
    pub fn no_work() -> Self {
        Self::default()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_no_work(&self) -> bool {
        self.host.is_empty() || self.path.is_empty()
    }
}

/// Word counts a worker computed for one assigned path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultReport {
    path: String,
    counts: WordCounts,
}

impl ResultReport {
    /// Fails unless `path` is a single token and every word is a non-empty
    /// single token.
    pub fn new(path: impl Into<String>, counts: WordCounts) -> Result<Self, ProtocolError> {
        let path = token(path.into(), "path", true)?;
        if let Some(word) = counts
            .keys()
            .find(|word| word.is_empty() || word.chars().any(char::is_whitespace))
        {
            return Err(ProtocolError::Malformed(format!(
                "word {word:?} is not a single token"
            )));
        }
        Ok(Self { path, counts })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn counts(&self) -> &WordCounts {
        &self.counts
    }
}

/// One protocol exchange unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Worker to document host.
    Fetch(FetchRequest),

    /// Worker to coordinator: "give me something to do".
    WorkRequest,

    /// Coordinator to worker.
    WorkAssignment(WorkAssignment),

    /// Worker to coordinator: counts for a finished path.
    ResultReport(ResultReport),

    /// Coordinator to worker: report received.
    ResultAck,
}

impl Message {
    /// Short variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Fetch(_) => "FetchRequest",
            Message::WorkRequest => "WorkRequest",
            Message::WorkAssignment(_) => "WorkAssignment",
            Message::ResultReport(_) => "ResultReport",
            Message::ResultAck => "ResultAck",
        }
    }

    /// Serialize into wire bytes. Never fails.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);

        match self {
            Message::Fetch(request) => {
                put_line(
                    &mut buf,
                    &format!("{FETCH_PREFIX}{} {HTTP_VERSION}", request.path),
                );
                put_field(&mut buf, HOST_LABEL, &request.host);
            }
            Message::WorkRequest => put_line(&mut buf, WORK_REQUEST_PREFIX),
            Message::WorkAssignment(assignment) => {
                put_line(&mut buf, WORK_ASSIGNMENT_PREFIX);
                put_field(&mut buf, HOST_LABEL, &assignment.host);
                put_field(&mut buf, PATH_LABEL, &assignment.path);
            }
            Message::ResultReport(report) => {
                put_line(&mut buf, RESULT_REPORT_PREFIX);
                put_field(&mut buf, PATH_LABEL, &report.path);
                put_line(&mut buf, WORD_COUNTS_LABEL);
                for (word, count) in rank(&report.counts) {
                    put_line(&mut buf, &format!("{word} {count}"));
                }
            }
            Message::ResultAck => put_line(&mut buf, RESULT_ACK_PREFIX),
        }

        // Blank line terminates every message.
        buf.put_slice(CRLF);
        buf.freeze()
    }
}

impl From<FetchRequest> for Message {
    fn from(request: FetchRequest) -> Self {
        Message::Fetch(request)
    }
}

impl From<WorkAssignment> for Message {
    fn from(assignment: WorkAssignment) -> Self {
        Message::WorkAssignment(assignment)
    }
}

impl From<ResultReport> for Message {
    fn from(report: ResultReport) -> Self {
        Message::ResultReport(report)
    }
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF);
}

fn put_field(buf: &mut BytesMut, label: &str, value: &str) {
    put_line(buf, &format!("{label} {value}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> WordCounts {
        pairs.iter().map(|(w, c)| (w.to_string(), *c)).collect()
    }

    #[test]
    fn encodes_fetch_request_as_http_get() {
        let msg = Message::from(FetchRequest::new("some-host", "some-path").unwrap());
        assert_eq!(
            msg.encode(),
            Bytes::from_static(b"GET some-path HTTP/1.1\r\nHost: some-host\r\n\r\n")
        );
    }

    #[test]
    fn encodes_keyword_only_messages() {
        assert_eq!(Message::WorkRequest.encode(), Bytes::from_static(b"ReqW\r\n\r\n"));
        assert_eq!(Message::ResultAck.encode(), Bytes::from_static(b"AckW\r\n\r\n"));
    }

    #[test]
    fn encodes_work_assignment() {
        let msg = Message::from(WorkAssignment::new("www.gutenberg.org", "/cache/epub/1513/pg1513.txt").unwrap());
        assert_eq!(
            msg.encode(),
            Bytes::from_static(
                b"AsgW\r\nHost: www.gutenberg.org\r\nPath: /cache/epub/1513/pg1513.txt\r\n\r\n"
            )
        );
    }

    #[test]
    fn encodes_no_work_sentinel_with_empty_fields() {
        let msg = Message::from(WorkAssignment::no_work());
        assert_eq!(msg.encode(), Bytes::from_static(b"AsgW\r\nHost: \r\nPath: \r\n\r\n"));
    }

    #[test]
    fn encodes_result_report_in_rank_order() {
        let msg = Message::from(ResultReport::new(
            "some-path",
            counts(&[("hello", 10), ("world", 20)]),
        )
        .unwrap());
        assert_eq!(
            msg.encode(),
            Bytes::from_static(
                b"SubW\r\nPath: some-path\r\nWord-Counts:\r\nworld 20\r\nhello 10\r\n\r\n"
            )
        );
    }

    #[test]
    fn encodes_result_report_without_counts() {
        let msg = Message::from(ResultReport::new("p", WordCounts::default()).unwrap());
        assert_eq!(
            msg.encode(),
            Bytes::from_static(b"SubW\r\nPath: p\r\nWord-Counts:\r\n\r\n")
        );
    }

    #[test]
    fn no_work_requires_only_one_empty_field() {
        assert!(WorkAssignment::no_work().is_no_work());
        assert!(WorkAssignment::new("host", "").unwrap().is_no_work());
        assert!(!WorkAssignment::new("host", "/path").unwrap().is_no_work());
    }

    #[test]
    fn fetch_request_points_at_https_url() {
        let request = FetchRequest::new("www.gutenberg.org", "/cache/epub/1513/pg1513.txt").unwrap();
        assert_eq!(
            request.https_url(),
            "https://www.gutenberg.org/cache/epub/1513/pg1513.txt"
        );
    }

    #[test]
    fn values_that_cannot_cross_the_wire_are_refused() {
        assert!(FetchRequest::new("h", "").unwrap_err().is_malformed());
        assert!(FetchRequest::new("h", "/a b").is_err());
        assert!(FetchRequest::new("a host", "/p").is_err());
        assert!(WorkAssignment::new("a b", "/p").is_err());
        assert!(WorkAssignment::new("h", "/p\r\nHost: x").is_err());
        assert!(ResultReport::new("/a b", WordCounts::default()).is_err());
        assert!(ResultReport::new("/p", counts(&[("two words", 1)])).is_err());
        assert!(ResultReport::new("/p", counts(&[("", 1)])).is_err());
    }

    #[test]
    fn empty_fields_are_allowed_where_the_grammar_allows_them() {
        assert!(FetchRequest::new("", "/p").is_ok());
        assert!(WorkAssignment::new("", "").unwrap().is_no_work());
        assert!(ResultReport::new("", WordCounts::default()).is_ok());
    }
}
