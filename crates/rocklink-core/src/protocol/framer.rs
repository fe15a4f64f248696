//! Inbound byte framing
//!
//! The modem's reply stream is line-oriented except for exactly one command
//! (SBDRB), whose reply is a length-prefixed binary frame with no terminator.
//! The framer runs in one of two modes: text mode splits the stream on LF and
//! hands out complete lines (CR left in place, patterns tolerate it); binary
//! mode accumulates raw bytes into a fixed buffer and flushes the collected
//! prefix as a single blob when its time window closes.

use byteorder::{BigEndian, ByteOrder};
use std::time::{Duration, Instant};

use super::BINARY_BUFFER_CAPACITY;

/// One framed unit handed to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Blob(Vec<u8>),
}

struct BinaryRead {
    buffer: Vec<u8>,
    armed_at: Instant,
    window: Duration,
    /// Total frame size once the 2-byte length prefix has arrived
    expected: Option<usize>,
}

/// Splits the inbound stream into lines or one timed binary blob
pub struct LineFramer {
    pending: String,
    binary: Option<BinaryRead>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            binary: None,
        }
    }

    /// Switch to binary mode; the blob flushes `window` after `now`
    pub fn enter_binary_mode(&mut self, window: Duration, now: Instant) {
        self.binary = Some(BinaryRead {
            buffer: Vec::with_capacity(BINARY_BUFFER_CAPACITY),
            armed_at: now,
            window,
            expected: None,
        });
    }

    pub fn in_binary_mode(&self) -> bool {
        self.binary.is_some()
    }

    /// Leave binary mode without flushing (the read was abandoned)
    pub fn abort_binary(&mut self) {
        self.binary = None;
    }

    /// Feed raw bytes; returns the frames completed by this chunk
    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Vec<Frame> {
        if let Some(ctx) = self.binary.as_mut() {
            let room = BINARY_BUFFER_CAPACITY - ctx.buffer.len();
            let take = bytes.len().min(room);
            ctx.buffer.extend_from_slice(&bytes[..take]);

            // The first two bytes advertise the payload length; once the
            // payload and trailing checksum are all here there is nothing
            // left to wait for.
            if ctx.expected.is_none() && ctx.buffer.len() >= 2 {
                let len = BigEndian::read_u16(&ctx.buffer[0..2]) as usize;
                ctx.expected = Some(2 + len + 2);
            }
            if ctx.expected.map_or(false, |n| ctx.buffer.len() >= n) {
                return self.flush_binary();
            }
            return self.tick(now);
        }

        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut frames = Vec::new();
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            frames.push(Frame::Line(line.trim_end_matches('\n').to_string()));
        }
        frames
    }

    /// Check the binary flush window; called on every pump iteration
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let expired = self
            .binary
            .as_ref()
            .map_or(false, |ctx| now.duration_since(ctx.armed_at) >= ctx.window);
        if expired {
            self.flush_binary()
        } else {
            Vec::new()
        }
    }

    fn flush_binary(&mut self) -> Vec<Frame> {
        match self.binary.take() {
            Some(ctx) => vec![Frame::Blob(ctx.buffer)],
            None => Vec::new(),
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
