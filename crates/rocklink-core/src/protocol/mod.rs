//! AT transport and SBD session engine
//!
//! Implements the line-oriented AT dialog with Iridium 9602/9603-class
//! transceivers and the multi-step SBDIX session used to trade messages
//! with the gateway.

pub mod command;
mod driver;
mod engine;
mod error;
pub mod events;
mod framer;
pub mod serial;
pub mod session;
mod stream;

pub use command::{AtCommand, Payload, Reply};
pub use driver::{DriverConfig, MessagePending, SbdModem};
pub use engine::{EngineEvent, ProtocolEngine, Unsolicited};
pub use error::DriverError;
pub use events::EventBus;
pub use framer::{Frame, LineFramer};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{ModemChannel, SerialChannel};

/// Default serial speed of the modem family
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default per-command ceiling in milliseconds. SBDIX sessions genuinely
/// take tens of seconds under a marginal sky view.
pub const DEFAULT_TIMEOUT_MS: u64 = 40_000;

/// Ceiling for short housekeeping commands (echo off, buffer clears)
pub const SIMPLE_TIMEOUT_MS: u64 = 2_000;

/// Default MO retry ceiling
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Back-off between failed MO attempts
pub const RETRY_DELAY_MS: u64 = 20_000;

/// Delay before a follow-up mailbox check drains queued MT messages
pub const DRAIN_DELAY_MS: u64 = 1_000;

/// Window the SBDRB binary frame is collected in before flushing
pub const MT_FLUSH_WINDOW_MS: u64 = 1_000;

/// Binary receive buffer size; MT payloads top out at 270 bytes
pub const BINARY_BUFFER_CAPACITY: usize = 2048;

/// Largest MO payload the 9602 accepts over SBDWB
pub const MAX_MO_PAYLOAD: usize = 340;

/// Largest MO text the 9602 accepts over SBDWT
pub const MAX_MO_TEXT: usize = 120;

/// Pump poll interval while waiting on the line
pub const POLL_INTERVAL_MS: u64 = 2;

/// Iridium network epoch: 2014-05-11 14:23:55 UTC
pub const IRIDIUM_EPOCH_SECS: i64 = 1_399_818_235;

/// One network time tick in milliseconds
pub const IRIDIUM_TICK_MS: i64 = 90;
