//! AT command descriptors
//!
//! Every exchange with the modem is described up front: what goes on the
//! wire, which line terminates the reply, which lines are worth keeping,
//! and how long to wait before giving up.

use regex::Regex;
use std::time::Duration;

/// What gets written to the modem
#[derive(Debug, Clone)]
pub enum Payload {
    /// ASCII command, CR appended on the wire
    Text(String),
    /// Raw bytes written verbatim (SBDWB message body)
    Raw(Vec<u8>),
}

/// A single AT exchange: payload out, classified reply in.
///
/// `end_pattern == None` means the reply is not line-oriented at all: the
/// framer drops into binary mode and flushes whatever arrived inside
/// `binary_window` as one opaque blob (the SBDRB frame).
#[derive(Debug, Clone)]
pub struct AtCommand {
    pub payload: Payload,
    pub end_pattern: Option<Regex>,
    pub keep_pattern: Option<Regex>,
    /// None disables the deadline entirely (wait-forever)
    pub timeout: Option<Duration>,
    pub binary_window: Duration,
}

impl AtCommand {
    /// Text command terminated by a line matching `end`
    pub fn text(payload: impl Into<String>, end: &str, timeout: Option<Duration>) -> Self {
        Self {
            payload: Payload::Text(payload.into()),
            end_pattern: Some(Regex::new(end).expect("invalid end pattern")),
            keep_pattern: None,
            timeout,
            binary_window: Duration::from_millis(0),
        }
    }

    /// Raw bytes terminated by a line matching `end`
    pub fn raw(payload: Vec<u8>, end: &str, timeout: Option<Duration>) -> Self {
        Self {
            payload: Payload::Raw(payload),
            end_pattern: Some(Regex::new(end).expect("invalid end pattern")),
            keep_pattern: None,
            timeout,
            binary_window: Duration::from_millis(0),
        }
    }

    /// Text command whose reply is a binary blob flushed after `window`
    pub fn binary_read(
        payload: impl Into<String>,
        window: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            payload: Payload::Text(payload.into()),
            end_pattern: None,
            keep_pattern: None,
            timeout,
            binary_window: window,
        }
    }

    /// Retain only lines matching `keep` in the reply body
    pub fn keep(mut self, keep: &str) -> Self {
        self.keep_pattern = Some(Regex::new(keep).expect("invalid keep pattern"));
        self
    }

    /// Bytes as they go out on the wire
    pub fn wire_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Text(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(b'\r');
                bytes
            }
            Payload::Raw(b) => b.clone(),
        }
    }

    /// Short human-readable form for traces
    pub fn describe(&self) -> String {
        match &self.payload {
            Payload::Text(s) => s.clone(),
            Payload::Raw(b) => format!("<{} raw bytes>", b.len()),
        }
    }
}

/// A completed reply: collected text lines or one binary blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Vec<u8>),
}

impl Reply {
    /// Text body, empty for binary replies
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(s) => s,
            Reply::Binary(_) => "",
        }
    }
}
