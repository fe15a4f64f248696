//! SBD session wire formats
//!
//! The parsing and byte-level encoding the session state machine leans on:
//! the `+SBDIX` status line, the MO checksum trailer, the MT binary frame,
//! and the three query responses (signal quality, system time, network time).

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

use super::{DriverError, IRIDIUM_EPOCH_SECS, IRIDIUM_TICK_MS};

/// Parsed `+SBDIX: <status>, <momsn>, <mtstatus>, <mtmsn>, <mtlen>, <mtqueued>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionResult {
    pub mo_status: u32,
    pub momsn: u32,
    pub mt_status: u32,
    pub mtmsn: u32,
    pub mt_len: u32,
    pub mt_queued: u32,
}

impl SessionResult {
    /// MO delivery succeeded (gateway status codes 0..=4)
    pub fn mo_ok(&self) -> bool {
        self.mo_status <= 4
    }

    /// The error the gateway's MO status maps to; `None` on success
    pub fn mo_failure(&self) -> Option<DriverError> {
        match self.mo_status {
            0..=4 => None,
            18 => Some(DriverError::RadioFailure),
            32 => Some(DriverError::NetworkFailure),
            other => Some(DriverError::UnknownSbdFailure(other)),
        }
    }
}

/// Parse the retained `+SBDIX` status line out of a session reply body
pub fn parse_session_result(body: &str) -> Result<SessionResult, DriverError> {
    let pattern = Regex::new(
        r"\+SBDIX:\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)",
    )
    .expect("static pattern");
    let caps = pattern
        .captures(body)
        .ok_or_else(|| DriverError::Unparseable {
            expected: "+SBDIX",
            line: body.trim().to_string(),
        })?;

    let field = |i: usize| -> Result<u32, DriverError> {
        caps[i].parse().map_err(|_| DriverError::Unparseable {
            expected: "+SBDIX",
            line: body.trim().to_string(),
        })
    };

    Ok(SessionResult {
        mo_status: field(1)?,
        momsn: field(2)?,
        mt_status: field(3)?,
        mtmsn: field(4)?,
        mt_len: field(5)?,
        mt_queued: field(6)?,
    })
}

/// Sum of the payload bytes, low 16 bits; the checksum both directions use
pub fn payload_checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// MO body as SBDWB wants it: payload then big-endian checksum
pub fn encode_mo_payload(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 2);
    bytes.extend_from_slice(payload);
    let mut trailer = [0u8; 2];
    BigEndian::write_u16(&mut trailer, payload_checksum(payload));
    bytes.extend_from_slice(&trailer);
    bytes
}

/// Decode an SBDRB frame: `len_hi len_lo payload[len] ck_hi ck_lo`.
/// The checksum is verified; a short or corrupt frame never yields a payload.
pub fn decode_mt_frame(blob: &[u8]) -> Result<Vec<u8>, DriverError> {
    if blob.len() < 4 {
        return Err(DriverError::Unparseable {
            expected: "SBDRB frame",
            line: format!("{} bytes", blob.len()),
        });
    }
    let len = BigEndian::read_u16(&blob[0..2]) as usize;
    if blob.len() < 2 + len + 2 {
        return Err(DriverError::Unparseable {
            expected: "SBDRB frame",
            line: format!("{} bytes, advertised payload {}", blob.len(), len),
        });
    }

    let payload = &blob[2..2 + len];
    let expected = payload_checksum(payload);
    let actual = BigEndian::read_u16(&blob[2 + len..2 + len + 2]);
    if expected != actual {
        return Err(DriverError::ChecksumMismatch { expected, actual });
    }
    Ok(payload.to_vec())
}

/// Parse `+CSQ:<n>` into the 0..=5 signal bar count
pub fn parse_signal_quality(body: &str) -> Result<u8, DriverError> {
    let pattern = Regex::new(r"CSQ:\s*(\d+)").expect("static pattern");
    pattern
        .captures(body)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| DriverError::Unparseable {
            expected: "+CSQ",
            line: body.trim().to_string(),
        })
}

/// Parse `+CCLK: YY/MM/DD,HH:MM:SS` as UTC, years counted from 2000
pub fn parse_system_time(body: &str) -> Result<DateTime<Utc>, DriverError> {
    let pattern = Regex::new(r"CCLK:\s*(\d\d)/(\d\d)/(\d\d),(\d\d):(\d\d):(\d\d)")
        .expect("static pattern");
    let unparseable = || DriverError::Unparseable {
        expected: "+CCLK",
        line: body.trim().to_string(),
    };
    let caps = pattern.captures(body).ok_or_else(unparseable)?;
    let num = |i: usize| caps[i].parse::<u32>().unwrap_or(0);

    Utc.with_ymd_and_hms(
        2000 + num(1) as i32,
        num(2),
        num(3),
        num(4),
        num(5),
        num(6),
    )
    .single()
    .ok_or_else(unparseable)
}

/// Parse the `-MSSTM` hex token and place it on the Iridium epoch
/// (2014-05-11 14:23:55 UTC), one tick per 90 ms
pub fn parse_network_time(body: &str) -> Result<DateTime<Utc>, DriverError> {
    let pattern = Regex::new(r"MSSTM:\s*([0-9a-fA-F]{1,8})").expect("static pattern");
    let unparseable = || DriverError::Unparseable {
        expected: "-MSSTM",
        line: body.trim().to_string(),
    };
    let caps = pattern.captures(body).ok_or_else(unparseable)?;
    let ticks = u32::from_str_radix(&caps[1], 16).map_err(|_| unparseable())?;

    let millis = i64::from(ticks) * IRIDIUM_TICK_MS;
    let secs = IRIDIUM_EPOCH_SECS + millis / 1000;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos).single().ok_or_else(unparseable)
}
