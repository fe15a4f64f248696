//! Command engine and response router
//!
//! One full-duplex byte stream carries three logical channels: replies to the
//! command currently in flight, unsolicited notifications the modem emits on
//! its own (ring alerts, registration events), and the occasional binary
//! frame. The engine demultiplexes them while holding the two invariants the
//! rest of the driver leans on: at most one command is in flight, and every
//! submitted command completes exactly once (body, modem error, or timeout).
//!
//! The engine is deliberately I/O-free. The driver writes the bytes
//! `submit()` hands back, feeds whatever arrives into `push()`, and calls
//! `tick()` so deadlines and the binary flush window can fire. State lives in
//! a single-cell inflight slot, not in driver-wide variables, so "empty" vs
//! "full" is always unambiguous.

use regex::Regex;
use std::time::Instant;

use super::command::{AtCommand, Reply};
use super::framer::{Frame, LineFramer};
use super::DriverError;

/// Notifications the modem emits outside any command dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsolicited {
    /// SBDRING: the gateway holds a message for us
    RingAlert,
    /// +AREG:<event>,<error> auto-registration notice
    AutoRegistration { event: u32, error: u32 },
}

/// What the engine produced for one chunk of input
#[derive(Debug)]
pub enum EngineEvent {
    /// The inflight command finished
    Completed(Result<Reply, DriverError>),
    Unsolicited(Unsolicited),
    /// Line that matched nothing while no command was in flight
    Discarded(String),
}

struct Inflight {
    end_pattern: Option<Regex>,
    keep_pattern: Option<Regex>,
    body: String,
    deadline: Option<Instant>,
}

/// Serializes AT dialogs over the framed stream
pub struct ProtocolEngine {
    framer: LineFramer,
    inflight: Option<Inflight>,
    unsolicited: Vec<(Regex, UnsolicitedKind)>,
    error_patterns: Vec<Regex>,
}

enum UnsolicitedKind {
    RingAlert,
    AutoRegistration,
}

impl ProtocolEngine {
    pub fn new() -> Self {
        let unsolicited = vec![
            (
                Regex::new("SBDRING").expect("static pattern"),
                UnsolicitedKind::RingAlert,
            ),
            (
                Regex::new(r"\+AREG:\s*(\d+)\s*,\s*(\d+)").expect("static pattern"),
                UnsolicitedKind::AutoRegistration,
            ),
        ];
        let error_patterns = vec![Regex::new("ERROR").expect("static pattern")];
        Self {
            framer: LineFramer::new(),
            inflight: None,
            unsolicited,
            error_patterns,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.inflight.is_none()
    }

    /// Accept a command for transmission.
    ///
    /// Returns the bytes the driver must put on the wire. Fails with `Busy`
    /// while another command occupies the slot; issuing a second command
    /// mid-flight is a caller bug, not something to queue silently.
    pub fn submit(&mut self, cmd: &AtCommand, now: Instant) -> Result<Vec<u8>, DriverError> {
        if self.inflight.is_some() {
            return Err(DriverError::Busy);
        }

        if cmd.end_pattern.is_none() {
            self.framer.enter_binary_mode(cmd.binary_window, now);
        }
        self.inflight = Some(Inflight {
            end_pattern: cmd.end_pattern.clone(),
            keep_pattern: cmd.keep_pattern.clone(),
            body: String::new(),
            deadline: cmd.timeout.map(|t| now + t),
        });
        Ok(cmd.wire_bytes())
    }

    /// Drop the inflight command without completing it. Only for the case
    /// where its payload never made it onto the wire; once bytes are out,
    /// completion (or timeout) is the only way the slot empties.
    pub fn abort(&mut self) {
        self.inflight = None;
        self.framer.abort_binary();
    }

    /// Feed inbound bytes, returning completions and unsolicited events in
    /// arrival order
    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Vec<EngineEvent> {
        let frames = self.framer.push(bytes, now);
        self.route(frames)
    }

    /// Advance time: fire the binary flush window and the command deadline
    pub fn tick(&mut self, now: Instant) -> Vec<EngineEvent> {
        let frames = self.framer.tick(now);
        let mut events = self.route(frames);

        let expired = self
            .inflight
            .as_ref()
            .and_then(|f| f.deadline)
            .map_or(false, |d| now >= d);
        if expired {
            // Completing (not just logging) on expiry is what keeps callers
            // from hanging when the modem goes quiet mid-dialog.
            self.inflight = None;
            events.push(EngineEvent::Completed(Err(DriverError::Timeout)));
        }
        events
    }

    fn route(&mut self, frames: Vec<Frame>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for frame in frames {
            match frame {
                Frame::Blob(blob) => {
                    // A blob can only exist because a binary-read command
                    // armed the framer; complete that command with it.
                    if self.inflight.take().is_some() {
                        events.push(EngineEvent::Completed(Ok(Reply::Binary(blob))));
                    }
                }
                Frame::Line(line) => {
                    if let Some(event) = self.route_line(line) {
                        events.push(event);
                    }
                }
            }
        }
        events
    }

    fn route_line(&mut self, line: String) -> Option<EngineEvent> {
        // Unsolicited patterns outrank the inflight dialog so that a ring
        // alert landing between a command and its terminator is never
        // swallowed into a response body.
        for (pattern, kind) in &self.unsolicited {
            if let Some(caps) = pattern.captures(&line) {
                let unsolicited = match kind {
                    UnsolicitedKind::RingAlert => Unsolicited::RingAlert,
                    UnsolicitedKind::AutoRegistration => {
                        // Malformed capture groups are a modem quirk to log,
                        // never a reason to fail the stream
                        let event = caps.get(1).and_then(|m| m.as_str().parse().ok());
                        let error = caps.get(2).and_then(|m| m.as_str().parse().ok());
                        match (event, error) {
                            (Some(event), Some(error)) => {
                                Unsolicited::AutoRegistration { event, error }
                            }
                            _ => return Some(EngineEvent::Discarded(line)),
                        }
                    }
                };
                return Some(EngineEvent::Unsolicited(unsolicited));
            }
        }

        if self.inflight.is_none() {
            return Some(EngineEvent::Discarded(line));
        }

        for pattern in &self.error_patterns {
            if pattern.is_match(&line) {
                let body = self.inflight.take().map(|f| f.body).unwrap_or_default();
                return Some(EngineEvent::Completed(Err(DriverError::ModemError(body))));
            }
        }

        let mut done = false;
        if let Some(inflight) = self.inflight.as_mut() {
            let keep = inflight
                .keep_pattern
                .as_ref()
                .map_or(true, |p| p.is_match(&line));
            if keep {
                inflight.body.push_str(&line);
                inflight.body.push('\n');
            }
            done = inflight
                .end_pattern
                .as_ref()
                .map_or(false, |p| p.is_match(&line));
        }
        if done {
            let body = self.inflight.take().map(|f| f.body).unwrap_or_default();
            return Some(EngineEvent::Completed(Ok(Reply::Text(body))));
        }
        None
    }
}

impl Default for ProtocolEngine {
    fn default() -> Self {
        Self::new()
    }
}
