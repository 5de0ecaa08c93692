//! CSV export of history.
//!
//! Format:
//!
//! ```text
//! Timestamp,Gas_PPM,Temp_C
//! 2026-03-01T12:00:00Z,612,22.4
//! ```
//!
//! Timestamps are RFC 3339, ppm is rounded to an integer and temperature is
//! written as-is.

use std::io;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use smartguard_types::TelemetrySample;

use crate::error::Result;
use crate::history::{HistoryOrigin, HistoryRange};

/// CSV header row.
pub const CSV_HEADER: [&str; 3] = ["Timestamp", "Gas_PPM", "Temp_C"];

/// One exported row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CsvRecord {
    #[serde(rename = "Timestamp", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "Gas_PPM")]
    pub ppm: i64,
    #[serde(rename = "Temp_C")]
    pub temperature: f64,
}

impl From<&TelemetrySample> for CsvRecord {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            timestamp: sample.timestamp,
            ppm: sample.ppm.round() as i64,
            temperature: sample.temperature,
        }
    }
}

/// Write `samples` as CSV. Returns the number of data rows written.
pub fn write_csv<W: io::Write>(writer: W, samples: &[TelemetrySample]) -> Result<usize> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for sample in samples {
        csv.serialize(CsvRecord::from(sample))?;
    }
    csv.flush()?;
    Ok(samples.len())
}

/// Render `samples` as a CSV string.
pub fn to_csv_string(samples: &[TelemetrySample]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, samples)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read rows written by [`write_csv`].
pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<CsvRecord>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for row in csv.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// File name for an export made at `now`.
///
/// ```
/// use smartguard_core::export::export_file_name;
/// use smartguard_core::history::{HistoryOrigin, HistoryRange};
/// use time::macros::datetime;
///
/// let now = datetime!(2026-03-01 0:00 UTC);
/// let name = export_file_name(HistoryOrigin::Cloud, HistoryRange::Day, now);
/// assert_eq!(name, "smartguard_cloud_24H_1772323200000.csv");
/// ```
pub fn export_file_name(origin: HistoryOrigin, range: HistoryRange, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("smartguard_{}_{}_{}.csv", origin.tag(), range, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn samples() -> Vec<TelemetrySample> {
        vec![
            TelemetrySample {
                ppm: 612.4,
                temperature: 22.4,
                humidity: 40.0,
                timestamp: datetime!(2026-03-01 12:00 UTC),
            },
            TelemetrySample {
                ppm: 1840.5,
                temperature: 23.125,
                humidity: 41.0,
                timestamp: datetime!(2026-03-01 12:05 UTC),
            },
        ]
    }

    #[test]
    fn test_csv_layout() {
        let text = to_csv_string(&samples()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Timestamp,Gas_PPM,Temp_C"));
        assert_eq!(lines.next(), Some("2026-03-01T12:00:00Z,612,22.4"));
        assert_eq!(lines.next(), Some("2026-03-01T12:05:00Z,1841,23.125"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_reads_back_rounded_triples() {
        let source = samples();
        let mut buf = Vec::new();
        assert_eq!(write_csv(&mut buf, &source).unwrap(), 2);

        let records = read_csv(buf.as_slice()).unwrap();
        let expected: Vec<CsvRecord> = source.iter().map(CsvRecord::from).collect();
        assert_eq!(records, expected);
    }

    #[test]
    fn test_empty_history_is_header_only() {
        let text = to_csv_string(&[]).unwrap();
        assert_eq!(text.trim_end(), "Timestamp,Gas_PPM,Temp_C");
        assert!(read_csv(text.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_file_name() {
        let name = export_file_name(
            HistoryOrigin::Simulated,
            HistoryRange::Hour,
            datetime!(2026-03-01 0:00:01.5 UTC),
        );
        assert_eq!(name, "smartguard_sim_1H_1772323201500.csv");
    }
}
