//! Driver errors

use thiserror::Error;

/// Errors that can occur while talking to the modem
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Serial port error: {0}")]
    TransportError(String),

    #[error("Command timeout")]
    Timeout,

    #[error("Not connected to modem")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("A command is already in flight")]
    Busy,

    #[error("Modem reported an error: {0:?}")]
    ModemError(String),

    #[error("Unparseable {expected} response: {line:?}")]
    Unparseable {
        expected: &'static str,
        line: String,
    },

    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("SBD session failed: radio failure")]
    RadioFailure,

    #[error("SBD session failed: network failure")]
    NetworkFailure,

    #[error("SBD session failed with status {0}")]
    UnknownSbdFailure(u32),

    #[error("Message not sent after {0} attempts")]
    MaxAttemptsExceeded(u32),

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
