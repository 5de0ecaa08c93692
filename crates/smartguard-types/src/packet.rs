//! Text packet codec for the proximity channel.
//!
//! Gateways and nodes push short colon-delimited text frames:
//!
//! ```text
//! ALERT:<deviceId>:<ppm>:<location>
//! DATA:<deviceId>:<ppm>:<temp>:<humidity>
//! ```
//!
//! The location of an `ALERT` is the trailing field and may itself contain
//! colons.

use core::fmt;
use core::str::FromStr;

use crate::error::{ParseError, ParseResult};

const ALERT: &str = "ALERT";
const DATA: &str = "DATA";

const ALERT_FIELDS: usize = 4;
const DATA_FIELDS: usize = 5;

/// A decoded proximity-channel packet.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshPacket {
    /// Emergency alert from a device.
    Alert {
        /// Remote-reported device id.
        device_id: String,
        /// Gas concentration in ppm.
        ppm: f64,
        /// Reported location.
        location: String,
    },
    /// Passive discovery/telemetry frame.
    Data {
        /// Remote-reported device id.
        device_id: String,
        /// Gas concentration in ppm.
        ppm: f64,
        /// Temperature in degrees Celsius.
        temperature: f64,
        /// Relative humidity percentage.
        humidity: f64,
    },
}

impl MeshPacket {
    /// Decode a packet from its text form.
    ///
    /// Surrounding whitespace and trailing NUL bytes (common in BLE
    /// notifications) are ignored. `ppm` must be a finite, non-negative
    /// number; a malformed temperature or humidity in a `DATA` frame reads
    /// as zero.
    ///
    /// ```
    /// use smartguard_types::MeshPacket;
    ///
    /// let packet = MeshPacket::parse("ALERT:N-7:3150.5:Boiler Room").unwrap();
    /// assert_eq!(packet.device_id(), "N-7");
    ///
    /// assert!(MeshPacket::parse("ALERT:X1").is_err());
    /// ```
    pub fn parse(text: &str) -> ParseResult<Self> {
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let kind = text.split(':').next().unwrap_or_default();
        match kind {
            ALERT => {
                let fields: Vec<&str> = text.splitn(ALERT_FIELDS, ':').collect();
                if fields.len() != ALERT_FIELDS {
                    return Err(ParseError::FieldCount {
                        kind: ALERT,
                        expected: ALERT_FIELDS,
                        actual: fields.len(),
                    });
                }
                Ok(MeshPacket::Alert {
                    device_id: parse_device_id(fields[1])?,
                    ppm: parse_ppm(fields[2])?,
                    location: fields[3].trim().to_string(),
                })
            }
            DATA => {
                let fields: Vec<&str> = text.split(':').collect();
                if fields.len() != DATA_FIELDS {
                    return Err(ParseError::FieldCount {
                        kind: DATA,
                        expected: DATA_FIELDS,
                        actual: fields.len(),
                    });
                }
                Ok(MeshPacket::Data {
                    device_id: parse_device_id(fields[1])?,
                    ppm: parse_ppm(fields[2])?,
                    temperature: parse_lenient(fields[3]),
                    humidity: parse_lenient(fields[4]),
                })
            }
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }

    /// Remote-reported id of the sending device.
    pub fn device_id(&self) -> &str {
        match self {
            MeshPacket::Alert { device_id, .. } | MeshPacket::Data { device_id, .. } => device_id,
        }
    }

    /// Gas concentration carried by the packet.
    pub fn ppm(&self) -> f64 {
        match self {
            MeshPacket::Alert { ppm, .. } | MeshPacket::Data { ppm, .. } => *ppm,
        }
    }

    /// Whether this is an emergency alert.
    pub fn is_alert(&self) -> bool {
        matches!(self, MeshPacket::Alert { .. })
    }
}

impl FromStr for MeshPacket {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MeshPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshPacket::Alert {
                device_id,
                ppm,
                location,
            } => write!(f, "{ALERT}:{device_id}:{ppm}:{location}"),
            MeshPacket::Data {
                device_id,
                ppm,
                temperature,
                humidity,
            } => write!(f, "{DATA}:{device_id}:{ppm}:{temperature}:{humidity}"),
        }
    }
}

fn parse_device_id(field: &str) -> ParseResult<String> {
    let id = field.trim();
    if id.is_empty() {
        return Err(ParseError::InvalidNumber {
            field: "deviceId",
            value: field.to_string(),
        });
    }
    Ok(id.to_string())
}

fn parse_ppm(field: &str) -> ParseResult<f64> {
    match field.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ParseError::InvalidNumber {
            field: "ppm",
            value: field.to_string(),
        }),
    }
}

fn parse_lenient(field: &str) -> f64 {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
