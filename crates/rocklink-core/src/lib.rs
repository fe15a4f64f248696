//! # RockLink Core Library
//!
//! Driver library for the Iridium Short Burst Data (SBD) satellite modem
//! family: the 9602/9603 transceivers found on RockBLOCK boards and
//! similar carriers.
//!
//! This library provides:
//! - AT-command transport over a serial line (or any byte channel)
//! - The SBDIX session state machine with retry and back-off
//! - Mobile-Originated text and binary sends, Mobile-Terminated reads
//! - Ring alert and registration event delivery
//! - Modem queries: signal quality, system time, network time
//!
//! ## Example
//!
//! ```rust,ignore
//! use rocklink_core::protocol::{DriverConfig, SbdModem};
//!
//! let mut modem = SbdModem::new(DriverConfig {
//!     port: "/dev/ttyUSB0".to_string(),
//!     ..DriverConfig::default()
//! });
//!
//! modem.on_ring_alert(|| println!("gateway has traffic for us"));
//! modem.on_new_message(|payload, queued| {
//!     println!("{} bytes in, {} more queued", payload.len(), queued);
//! });
//!
//! modem.open()?;
//! let momsn = modem.send_message("hello from the field")?;
//! println!("sent as MOMSN {}", momsn);
//! ```
//!
//! Sends are blocking: the driver owns the line and pumps it until the
//! gateway answers or the retries run out. Call [`protocol::SbdModem::poll`]
//! from your idle loop to service ring alerts between operations.

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        AtCommand, DriverConfig, DriverError, EventBus, MessagePending, ModemChannel, Reply,
        SbdModem, SerialChannel,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
