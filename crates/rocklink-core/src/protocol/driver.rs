//! Driver lifecycle and SBD session state machine
//!
//! Owns the channel to the modem and pumps it from the calling thread. Every
//! public operation is a sequence of AT dialogs run through the engine; the
//! send paths additionally walk the multi-step SBDIX session (write buffer,
//! wait for network, quiet the signal monitor, trade messages with the
//! gateway, read any mobile-terminated payload, clear buffers) with retry
//! and back-off around the whole attempt.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use super::command::{AtCommand, Reply};
use super::engine::{EngineEvent, ProtocolEngine, Unsolicited};
use super::events::EventBus;
use super::serial::{clear_buffers, configure_port, open_port};
use super::session::{decode_mt_frame, encode_mo_payload, parse_network_time,
    parse_session_result, parse_signal_quality, parse_system_time};
use super::stream::{ModemChannel, SerialChannel};
use super::{
    DriverError, DEFAULT_BAUD_RATE, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_MS, DRAIN_DELAY_MS,
    MAX_MO_PAYLOAD, MAX_MO_TEXT, MT_FLUSH_WINDOW_MS, POLL_INTERVAL_MS, RETRY_DELAY_MS,
    SIMPLE_TIMEOUT_MS,
};

/// Driver configuration, captured at open time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Device path (e.g., "/dev/ttyUSB0")
    pub port: String,
    /// Serial speed; the 9602/9603 default is 19200
    pub baud_rate: u32,
    /// Emit debug events and stderr traces
    pub debug: bool,
    /// Per-command ceiling in milliseconds
    pub default_timeout_ms: u64,
    /// Ceiling for short housekeeping commands
    pub simple_timeout_ms: u64,
    /// MO retry ceiling
    pub max_attempts: u32,
    /// Network-wait ceiling; None blocks until the constellation shows up
    pub max_wait_ms: Option<u64>,
    /// Hardware flow control
    pub flow_control: bool,
    /// Back-off between failed MO attempts
    pub retry_delay_ms: u64,
    /// Delay before a follow-up mailbox check drains queued MT messages
    pub drain_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            debug: false,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            simple_timeout_ms: SIMPLE_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_wait_ms: None,
            flow_control: false,
            retry_delay_ms: RETRY_DELAY_MS,
            drain_delay_ms: DRAIN_DELAY_MS,
        }
    }
}

/// Where the current MO message is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePending {
    /// Nothing buffered
    None,
    /// Written to the modem's MO buffer, session not yet run
    Buffered,
    /// SBDIX exchange with the gateway underway
    InSession,
}

#[derive(Debug, Clone, Copy)]
struct SessionState {
    message_pending: MessagePending,
    lock: bool,
    pending: u32,
    attempt: u32,
}

enum MoPayload {
    Text(String),
    Binary(Vec<u8>),
}

/// Iridium SBD modem driver
pub struct SbdModem {
    channel: Option<Box<dyn ModemChannel>>,
    config: DriverConfig,
    engine: ProtocolEngine,
    events: EventBus,
    state: SessionState,
}

impl SbdModem {
    /// Create a driver (not yet connected)
    pub fn new(config: DriverConfig) -> Self {
        Self {
            channel: None,
            config,
            engine: ProtocolEngine::new(),
            events: EventBus::new(),
            state: SessionState {
                message_pending: MessagePending::None,
                lock: false,
                pending: 0,
                attempt: 0,
            },
        }
    }

    /// Open the configured serial port and run the init sequence.
    /// Emits `initialized` on success; on failure the driver stays unusable
    /// until re-opened.
    pub fn open(&mut self) -> Result<(), DriverError> {
        if self.channel.is_some() {
            return Err(DriverError::AlreadyConnected);
        }
        let mut port = open_port(&self.config.port, Some(self.config.baud_rate))?;
        configure_port(port.as_mut(), self.config.flow_control)?;
        clear_buffers(port.as_mut())?;
        self.open_with(Box::new(SerialChannel::new(port)))
    }

    /// Run the driver over an already-open channel (a ser2net bridge, a
    /// scripted modem in tests). Same init sequence as `open`.
    pub fn open_with(&mut self, channel: Box<dyn ModemChannel>) -> Result<(), DriverError> {
        if self.channel.is_some() {
            return Err(DriverError::AlreadyConnected);
        }
        self.channel = Some(channel);
        match self.initialize() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.trace(&format!("init aborted: {}", e));
                self.channel = None;
                Err(e)
            }
        }
    }

    /// Flush and shut the transport
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            let _ = channel.flush();
        }
        self.channel = None;
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Last known count of MT messages waiting at the gateway
    pub fn queued_messages(&self) -> u32 {
        self.state.pending
    }

    pub fn message_pending(&self) -> MessagePending {
        self.state.message_pending
    }

    // --- Event subscription ---

    pub fn on_initialized(&mut self, handler: impl FnMut() + Send + 'static) {
        self.events.on_initialized(handler);
    }

    pub fn on_ring_alert(&mut self, handler: impl FnMut() + Send + 'static) {
        self.events.on_ring_alert(handler);
    }

    pub fn on_new_message(&mut self, handler: impl FnMut(&[u8], u32) + Send + 'static) {
        self.events.on_new_message(handler);
    }

    pub fn on_debug(&mut self, handler: impl FnMut(&str) + Send + 'static) {
        self.events.on_debug(handler);
    }

    // --- Message operations ---

    /// Send a text message; returns the gateway-assigned MOMSN.
    /// An empty string runs a plain mailbox check.
    pub fn send_message(&mut self, text: &str) -> Result<u32, DriverError> {
        if text.len() > MAX_MO_TEXT {
            return Err(DriverError::MessageTooLarge {
                size: text.len(),
                limit: MAX_MO_TEXT,
            });
        }
        self.mailbox_send(MoPayload::Text(text.to_string()))
    }

    /// Send a binary message; returns the gateway-assigned MOMSN.
    /// Zero-length payloads degrade to a mailbox check.
    pub fn send_binary_message(&mut self, payload: &[u8]) -> Result<u32, DriverError> {
        if payload.is_empty() {
            return self.mailbox_send(MoPayload::Text(String::new()));
        }
        if payload.len() > MAX_MO_PAYLOAD {
            return Err(DriverError::MessageTooLarge {
                size: payload.len(),
                limit: MAX_MO_PAYLOAD,
            });
        }
        self.mailbox_send(MoPayload::Binary(payload.to_vec()))
    }

    /// Run a session with an empty MO buffer to pick up queued MT traffic
    pub fn mailbox_check(&mut self) -> Result<u32, DriverError> {
        self.mailbox_send(MoPayload::Text(String::new()))
    }

    /// Service the line while idle: ring alerts and registration notices
    /// arrive on their own schedule, not in reply to anything.
    pub fn poll(&mut self) -> Result<(), DriverError> {
        if self.channel.is_none() {
            return Err(DriverError::NotConnected);
        }
        let mut scratch = [0u8; 512];
        loop {
            let n = self.read_available(&mut scratch)?;
            if n == 0 {
                break;
            }
            let events = self.engine.push(&scratch[..n], Instant::now());
            self.dispatch(events)?;
        }
        let events = self.engine.tick(Instant::now());
        self.dispatch(events)?;
        Ok(())
    }

    // --- Modem queries ---

    /// Signal quality, 0..=5 bars
    pub fn get_signal_quality(&mut self) -> Result<u8, DriverError> {
        let reply = self.run_command(AtCommand::text("AT+CSQ", "OK", self.default_timeout()))?;
        parse_signal_quality(reply.text())
    }

    /// Modem's own clock, UTC
    pub fn get_system_time(&mut self) -> Result<chrono::DateTime<chrono::Utc>, DriverError> {
        let reply = self.run_command(AtCommand::text("AT+CCLK?", "OK", self.simple_timeout()))?;
        parse_system_time(reply.text())
    }

    /// Constellation time, UTC (Iridium epoch plus 90 ms ticks)
    pub fn get_network_time(&mut self) -> Result<chrono::DateTime<chrono::Utc>, DriverError> {
        let reply = self.run_command(AtCommand::text("AT-MSSTM", "OK", self.simple_timeout()))?;
        parse_network_time(reply.text())
    }

    // --- Init ---

    fn initialize(&mut self) -> Result<(), DriverError> {
        // Echo off, both buffers cleared, auto-registration on, ring alerts on
        for command in ["ATE0", "AT+SBDD2", "AT+SBDAREG=1", "AT+SBDMTA=1"] {
            self.run_command(AtCommand::text(command, "OK", self.simple_timeout()))?;
        }
        self.trace("modem initialized");
        self.events.emit_initialized();
        Ok(())
    }

    // --- Session state machine ---

    fn mailbox_send(&mut self, payload: MoPayload) -> Result<u32, DriverError> {
        if self.channel.is_none() {
            return Err(DriverError::NotConnected);
        }
        if self.state.lock {
            return Err(DriverError::Busy);
        }
        self.state.lock = true;
        let result = self.mailbox_send_locked(&payload);
        self.state.lock = false;
        result
    }

    fn mailbox_send_locked(&mut self, payload: &MoPayload) -> Result<u32, DriverError> {
        self.state.attempt = 0;
        loop {
            self.state.attempt += 1;
            match self.attempt_session(payload) {
                Ok(momsn) => {
                    self.drain_mailbox();
                    return Ok(momsn);
                }
                Err(e) => {
                    self.trace(&format!(
                        "attempt {}/{} failed: {}",
                        self.state.attempt, self.config.max_attempts, e
                    ));
                    if self.state.attempt >= self.config.max_attempts {
                        return Err(DriverError::MaxAttemptsExceeded(self.config.max_attempts));
                    }
                    thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
                }
            }
        }
    }

    /// Follow-up mailbox checks until the gateway queue runs dry. The MO
    /// message already went through, so a drain failure only gets logged;
    /// the next ring alert will re-announce whatever is left.
    fn drain_mailbox(&mut self) {
        while self.state.pending > 0 {
            thread::sleep(Duration::from_millis(self.config.drain_delay_ms));
            self.trace(&format!(
                "draining gateway queue, {} message(s) left",
                self.state.pending
            ));
            if let Err(e) = self.attempt_session(&MoPayload::Text(String::new())) {
                self.trace(&format!("mailbox drain stopped: {}", e));
                break;
            }
        }
    }

    /// One full session attempt. Whatever goes wrong, the MO buffer is
    /// cleared before the error surfaces so the next attempt starts clean.
    fn attempt_session(&mut self, payload: &MoPayload) -> Result<u32, DriverError> {
        let result = self.attempt_session_inner(payload);
        if result.is_err() {
            if let Err(e) = self.clear_mo_buffer() {
                self.trace(&format!("MO buffer clear after failure failed too: {}", e));
            }
            self.state.message_pending = MessagePending::None;
        }
        result
    }

    fn attempt_session_inner(&mut self, payload: &MoPayload) -> Result<u32, DriverError> {
        self.write_mo_buffer(payload)?;
        self.state.message_pending = MessagePending::Buffered;

        self.wait_for_network()?;
        self.disable_signal_monitoring()?;

        self.state.message_pending = MessagePending::InSession;
        let session = self.initiate_session()?;
        if let Some(failure) = session.mo_failure() {
            return Err(failure);
        }
        self.state.message_pending = MessagePending::None;
        self.state.pending = session.mt_queued;

        match session.mt_status {
            0 => {}
            1 => {
                let blob = self.read_mt_frame()?;
                let message = decode_mt_frame(&blob)?;
                self.trace(&format!(
                    "MT message {} received, {} byte(s), {} more queued",
                    session.mtmsn,
                    message.len(),
                    session.mt_queued
                ));
                self.events.emit_new_message(&message, session.mt_queued);
                self.clear_mt_buffer()?;
            }
            other => {
                self.trace(&format!("MT status {} not actionable, skipping read", other));
            }
        }

        self.clear_mo_buffer()?;
        Ok(session.momsn)
    }

    fn write_mo_buffer(&mut self, payload: &MoPayload) -> Result<(), DriverError> {
        match payload {
            // A mailbox check sends nothing: just make sure the MO side is empty
            MoPayload::Text(text) if text.is_empty() => {
                self.clear_mo_buffer()?;
            }
            MoPayload::Text(text) => {
                self.run_command(AtCommand::text(
                    format!("AT+SBDWT={}", text),
                    "OK",
                    self.default_timeout(),
                ))?;
            }
            MoPayload::Binary(bytes) => {
                self.run_command(AtCommand::text(
                    format!("AT+SBDWB={}", bytes.len()),
                    "READY",
                    self.simple_timeout(),
                ))?;
                self.run_command(AtCommand::raw(
                    encode_mo_payload(bytes),
                    "OK",
                    self.default_timeout(),
                ))?;
            }
        }
        Ok(())
    }

    fn wait_for_network(&mut self) -> Result<(), DriverError> {
        let timeout = self.config.max_wait_ms.map(Duration::from_millis);
        // Signal-quality indications on; done once a +CIEV reports >= 1 bar
        self.run_command(AtCommand::text("AT+CIER=1,1,0", r"\+CIEV:0,[^0]", timeout))?;
        Ok(())
    }

    fn disable_signal_monitoring(&mut self) -> Result<(), DriverError> {
        self.run_command(AtCommand::text("AT+CIER=0,0,0", "OK", self.simple_timeout()))?;
        Ok(())
    }

    fn initiate_session(&mut self) -> Result<super::session::SessionResult, DriverError> {
        let reply = self
            .run_command(
                AtCommand::text("AT+SBDIXA", "OK", self.default_timeout()).keep(r"\+SBDIX"),
            )?;
        parse_session_result(reply.text())
    }

    fn read_mt_frame(&mut self) -> Result<Vec<u8>, DriverError> {
        let reply = self.run_command(AtCommand::binary_read(
            "AT+SBDRB",
            Duration::from_millis(MT_FLUSH_WINDOW_MS),
            self.default_timeout(),
        ))?;
        // The modem tails the frame with a status line that belongs to no
        // dialog; drop whatever is still queued before the next command
        if let Some(channel) = self.channel.as_mut() {
            let _ = channel.clear_input_buffer();
        }
        match reply {
            Reply::Binary(blob) => Ok(blob),
            Reply::Text(body) => Err(DriverError::Unparseable {
                expected: "SBDRB frame",
                line: body.trim().to_string(),
            }),
        }
    }

    fn clear_mo_buffer(&mut self) -> Result<(), DriverError> {
        self.run_command(AtCommand::text("AT+SBDD0", "OK", self.simple_timeout()))?;
        Ok(())
    }

    fn clear_mt_buffer(&mut self) -> Result<(), DriverError> {
        self.run_command(AtCommand::text("AT+SBDD1", "OK", self.simple_timeout()))?;
        Ok(())
    }

    // --- Pump ---

    /// Run one AT dialog to completion: write the payload, then feed the
    /// engine until it completes the command (reply, modem error, or
    /// deadline). Unsolicited traffic is dispatched as it interleaves.
    fn run_command(&mut self, cmd: AtCommand) -> Result<Reply, DriverError> {
        if self.channel.is_none() {
            return Err(DriverError::NotConnected);
        }
        let wire = self.engine.submit(&cmd, Instant::now())?;
        self.trace(&format!("--> {}", cmd.describe()));
        if let Err(e) = self.write_wire(&wire) {
            // Nothing can complete a command whose bytes never left
            self.engine.abort();
            return Err(e);
        }

        let mut scratch = [0u8; 512];
        loop {
            let n = self.read_available(&mut scratch)?;
            let now = Instant::now();
            let mut events = if n > 0 {
                self.engine.push(&scratch[..n], now)
            } else {
                Vec::new()
            };
            events.extend(self.engine.tick(now));

            if let Some(reply) = self.dispatch(events)? {
                return Ok(reply);
            }
            if n == 0 {
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
        }
    }

    /// Deliver engine events; returns the reply if one completed
    fn dispatch(&mut self, events: Vec<EngineEvent>) -> Result<Option<Reply>, DriverError> {
        let mut completed = None;
        for event in events {
            match event {
                EngineEvent::Completed(result) => completed = Some(result),
                EngineEvent::Unsolicited(unsolicited) => self.handle_unsolicited(unsolicited),
                EngineEvent::Discarded(line) => {
                    self.trace(&format!("discarded line {:?}", line.trim_end()));
                }
            }
        }
        match completed {
            Some(Ok(reply)) => Ok(Some(reply)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn handle_unsolicited(&mut self, unsolicited: Unsolicited) {
        match unsolicited {
            Unsolicited::RingAlert => {
                self.trace("ring alert");
                self.events.emit_ring_alert();
            }
            Unsolicited::AutoRegistration { event, error } => {
                self.trace(&format!(
                    "auto-registration event={} error={}",
                    event, error
                ));
            }
        }
    }

    fn write_wire(&mut self, wire: &[u8]) -> Result<(), DriverError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(DriverError::NotConnected)?;
        channel.write_all(wire)?;
        channel.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, DriverError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(DriverError::NotConnected)?;
        let available = channel
            .bytes_to_read()
            .map_err(|e| DriverError::TransportError(e.to_string()))?;
        if available == 0 {
            return Ok(0);
        }
        let to_read = buf.len().min(available as usize);
        match channel.read(&mut buf[..to_read]) {
            Ok(n) => Ok(n),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn simple_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.config.simple_timeout_ms))
    }

    fn default_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.config.default_timeout_ms))
    }

    fn trace(&mut self, message: &str) {
        if self.config.debug {
            eprintln!("[DEBUG] {}", message);
            self.events.emit_debug(message);
        }
    }
}

impl Drop for SbdModem {
    fn drop(&mut self) {
        self.close();
    }
}
