//! Validation of the NMEA sentence carried inside an NXDN GPS data payload.
//!
//! A reassembled buffer looks like:
//!
//! ```text
//! 0x06 $GPRMC,123456,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*60\r\n 0x00 ...
//! ^tag ^sentence start                                                  ^checksum
//! ```
//!
//! Validation is a pure function of the buffer; the extracted fields borrow
//! from it.

use std::fmt;

/// Payload tag identifying GPS (NMEA) data
pub const NXDN_DATA_TYPE_GPS: u8 = 0x06;

const SENTENCE_START: &[u8] = b"$G";
const CHECKSUM_DELIMITER: u8 = b'*';
const RMC_SENTENCE_TYPE: &[u8] = b"RMC";
const VALID_FIX: &str = "A";

// Positional RMC fields
const FIELD_STATUS: usize = 2;
const FIELD_LATITUDE: usize = 3;
const FIELD_LAT_HEMISPHERE: usize = 4;
const FIELD_LONGITUDE: usize = 5;
const FIELD_LON_HEMISPHERE: usize = 6;
const FIELD_SPEED: usize = 7;
const FIELD_BEARING: usize = 8;

/// Reason a completed buffer was not turned into a position report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Nothing was accumulated
    Empty,
    /// The payload tag is not GPS data (routine, other data types share the channel)
    NotGpsData(u8),
    /// The sentence does not open with `$G`
    MissingSentenceStart,
    /// No `*` checksum delimiter in the sentence
    MissingChecksumDelimiter,
    ChecksumMismatch { computed: String, received: String },
    /// Well-formed sentence of a type other than RMC
    UnsupportedSentence(String),
    /// Latitude, longitude or a hemisphere is missing or empty
    IncompletePosition,
    /// The status field is not the valid-fix code
    InvalidFix(String),
}

impl Rejection {
    /// Every label `reason` can return
    pub const REASONS: [&'static str; 8] = [
        "empty",
        "not_gps_data",
        "missing_sentence_start",
        "missing_checksum_delimiter",
        "checksum_mismatch",
        "unsupported_sentence",
        "incomplete_position",
        "invalid_fix",
    ];

    /// Stable snake_case label, used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty",
            Rejection::NotGpsData(_) => "not_gps_data",
            Rejection::MissingSentenceStart => "missing_sentence_start",
            Rejection::MissingChecksumDelimiter => "missing_checksum_delimiter",
            Rejection::ChecksumMismatch { .. } => "checksum_mismatch",
            Rejection::UnsupportedSentence(_) => "unsupported_sentence",
            Rejection::IncompletePosition => "incomplete_position",
            Rejection::InvalidFix(_) => "invalid_fix",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty data"),
            Rejection::NotGpsData(tag) => write!(f, "not GPS data type - {:02X}", tag),
            Rejection::MissingSentenceStart => write!(f, "doesn't start with $G"),
            Rejection::MissingChecksumDelimiter => write!(f, "can't find a *"),
            Rejection::ChecksumMismatch { computed, received } => {
                write!(f, "checksum failed - computed {}, received {}", computed, received)
            }
            Rejection::UnsupportedSentence(kind) => write!(f, "unhandled NMEA sentence {}", kind),
            Rejection::IncompletePosition => write!(f, "incomplete position data"),
            Rejection::InvalidFix(status) => write!(f, "GPS data isn't valid - {}", status),
        }
    }
}

/// Course over ground, both parts are present or neither is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Velocity {
    /// Degrees true
    pub bearing: i32,
    /// Knots
    pub speed: i32,
}

/// Validated fields of an RMC sentence, ready for formatting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmcFix<'a> {
    pub latitude: &'a str,
    pub lat_hemisphere: &'a str,
    pub longitude: &'a str,
    pub lon_hemisphere: &'a str,
    pub velocity: Option<Velocity>,
}

/// The sentence text inside a buffer: everything after the tag byte up to the
/// first NUL (the zero padding of the final block).
pub fn sentence_bytes(buffer: &[u8]) -> &[u8] {
    let payload = buffer.get(1..).unwrap_or_default();
    let end = payload
        .iter()
        .position(|&b| b == 0x00)
        .unwrap_or(payload.len());
    &payload[..end]
}

/// XOR of every byte in `data`
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Validate a completed buffer and extract the RMC position fields.
///
/// Checks short-circuit in a fixed order: tag, `$G`, `*`, checksum, sentence
/// type, field presence, fix status.
pub fn validate(buffer: &[u8]) -> Result<RmcFix<'_>, Rejection> {
    let tag = *buffer.first().ok_or(Rejection::Empty)?;
    if tag != NXDN_DATA_TYPE_GPS {
        return Err(Rejection::NotGpsData(tag));
    }

    let sentence = sentence_bytes(buffer);
    if !sentence.starts_with(SENTENCE_START) {
        return Err(Rejection::MissingSentenceStart);
    }

    let star = sentence
        .iter()
        .position(|&b| b == CHECKSUM_DELIMITER)
        .ok_or(Rejection::MissingChecksumDelimiter)?;

    verify_checksum(sentence, star)?;

    let kind = sentence.get(3..6).unwrap_or_default();
    if kind != RMC_SENTENCE_TYPE {
        return Err(Rejection::UnsupportedSentence(
            String::from_utf8_lossy(kind).into_owned(),
        ));
    }

    let fields = split_fields(&sentence[..star]);

    let latitude = required(&fields, FIELD_LATITUDE)?;
    let lat_hemisphere = required(&fields, FIELD_LAT_HEMISPHERE)?;
    let longitude = required(&fields, FIELD_LONGITUDE)?;
    let lon_hemisphere = required(&fields, FIELD_LON_HEMISPHERE)?;

    let status = fields.get(FIELD_STATUS).copied().unwrap_or_default();
    if status != VALID_FIX.as_bytes() {
        return Err(Rejection::InvalidFix(
            String::from_utf8_lossy(status).into_owned(),
        ));
    }

    let velocity = match (fields.get(FIELD_SPEED), fields.get(FIELD_BEARING)) {
        (Some(speed), Some(bearing)) if !speed.is_empty() && !bearing.is_empty() => {
            Some(Velocity {
                bearing: parse_leading_int(bearing),
                speed: parse_leading_int(speed),
            })
        }
        _ => None,
    };

    Ok(RmcFix {
        latitude,
        lat_hemisphere,
        longitude,
        lon_hemisphere,
        velocity,
    })
}

/// A position field as text; empty, absent or non-UTF-8 fields are unusable
fn required<'a>(fields: &[&'a [u8]], index: usize) -> Result<&'a str, Rejection> {
    match fields.get(index).map(|value| std::str::from_utf8(value)) {
        Some(Ok(value)) if !value.is_empty() => Ok(value),
        _ => Err(Rejection::IncompletePosition),
    }
}

/// Compare the XOR of the bytes between `$` and `*` against the two hex
/// digits following `*`, byte for byte.
fn verify_checksum(sentence: &[u8], star: usize) -> Result<(), Rejection> {
    let computed = format!("{:02X}", xor_checksum(&sentence[1..star]));
    let received = sentence
        .get(star + 1..)
        .unwrap_or_default()
        .iter()
        .take(2)
        .copied()
        .collect::<Vec<u8>>();

    if computed.as_bytes() == received.as_slice() {
        Ok(())
    } else {
        Err(Rejection::ChecksumMismatch {
            computed,
            received: String::from_utf8_lossy(&received).into_owned(),
        })
    }
}

/// Split a sentence into positional fields on `,`, CR and LF. Empty fields are
/// kept so that indices stay aligned with the sentence layout.
pub fn split_fields(sentence: &[u8]) -> Vec<&[u8]> {
    sentence
        .split(|&b| matches!(b, b',' | b'\r' | b'\n'))
        .collect()
}

/// Integer prefix of a decimal field, as `atoi` reads it: leading whitespace,
/// an optional sign, then digits. Anything else yields 0.
fn parse_leading_int(text: &[u8]) -> i32 {
    let text = text.trim_ascii_start();
    let (negative, digits) = match text.first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let value = digits
        .iter()
        .take_while(|d| d.is_ascii_digit())
        .fold(0i32, |acc, d| {
            acc.saturating_mul(10).saturating_add(i32::from(d - b'0'))
        });

    if negative { -value } else { value }
}
