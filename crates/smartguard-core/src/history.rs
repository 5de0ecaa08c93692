//! Telemetry history for charting and export.
//!
//! In demo mode history is simulated locally; otherwise it comes from the
//! cloud channel's feed. An unconfigured channel yields an empty history
//! without a network call.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use smartguard_types::{TelemetrySample, UserSettings};

use crate::cloud::{ChannelConfig, TelemetrySource};
use crate::error::{Error, Result};

/// Time span of a history view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1H")]
    Hour,
    #[default]
    #[serde(rename = "24H")]
    Day,
    #[serde(rename = "7D")]
    Week,
}

impl HistoryRange {
    /// Number of entries requested from the cloud feed.
    pub fn cloud_results(self) -> usize {
        match self {
            HistoryRange::Hour => 12,
            HistoryRange::Day => 48,
            HistoryRange::Week => 100,
        }
    }

    /// Number of simulated points.
    pub fn simulated_points(self) -> usize {
        match self {
            HistoryRange::Hour => 12,
            HistoryRange::Day => 24,
            HistoryRange::Week => 7,
        }
    }

    /// Spacing between simulated points.
    pub fn simulated_step(self) -> time::Duration {
        match self {
            HistoryRange::Hour => time::Duration::minutes(5),
            HistoryRange::Day => time::Duration::hours(1),
            HistoryRange::Week => time::Duration::days(1),
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRange::Hour => write!(f, "1H"),
            HistoryRange::Day => write!(f, "24H"),
            HistoryRange::Week => write!(f, "7D"),
        }
    }
}

impl FromStr for HistoryRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "1H" | "HOUR" => Ok(HistoryRange::Hour),
            "24H" | "DAY" => Ok(HistoryRange::Day),
            "7D" | "WEEK" => Ok(HistoryRange::Week),
            _ => Err(Error::invalid_config(format!(
                "unknown history range '{s}' (expected 1H, 24H or 7D)"
            ))),
        }
    }
}

/// Where a history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrigin {
    Simulated,
    Cloud,
}

impl HistoryOrigin {
    /// Short tag used in export file names.
    pub fn tag(self) -> &'static str {
        match self {
            HistoryOrigin::Simulated => "sim",
            HistoryOrigin::Cloud => "cloud",
        }
    }
}

/// A loaded history series, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub origin: HistoryOrigin,
    pub range: HistoryRange,
    pub samples: Vec<TelemetrySample>,
}

impl History {
    /// Summary statistics.
    pub fn summary(&self) -> HistorySummary {
        HistorySummary::from_samples(&self.samples)
    }

    /// Whether the series is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Peak and average concentration of a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Highest ppm (0 for an empty series).
    pub peak: f64,
    /// Mean ppm rounded to an integer (0 for an empty series).
    pub average: f64,
    /// Number of samples.
    pub count: usize,
}

impl HistorySummary {
    /// Summarize `samples`.
    pub fn from_samples(samples: &[TelemetrySample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let peak = samples.iter().map(|s| s.ppm).fold(f64::MIN, f64::max);
        let total: f64 = samples.iter().map(|s| s.ppm).sum();
        Self {
            peak,
            average: (total / samples.len() as f64).round(),
            count: samples.len(),
        }
    }
}

/// Build a simulated series ending at `now`.
///
/// Concentrations sit between 350 and 750 ppm, with one point in five
/// carrying a +1000 ppm spike.
pub fn simulate<R: Rng>(
    range: HistoryRange,
    now: OffsetDateTime,
    rng: &mut R,
) -> Vec<TelemetrySample> {
    let points = range.simulated_points();
    let step = range.simulated_step();

    (0..points)
        .map(|i| {
            let back = (points - 1 - i) as i32;
            let spike = if rng.random::<f64>() > 0.8 { 1000.0 } else { 0.0 };
            TelemetrySample {
                ppm: 350.0 + rng.random::<f64>() * 400.0 + spike,
                temperature: 22.0 + rng.random::<f64>() * 2.0,
                humidity: 40.0 + rng.random::<f64>() * 10.0,
                timestamp: now - step * back,
            }
        })
        .collect()
}

/// Load history for the current settings.
pub async fn load(
    settings: &UserSettings,
    source: &dyn TelemetrySource,
    range: HistoryRange,
    timeout: Duration,
    now: OffsetDateTime,
) -> Result<History> {
    if settings.demo_mode {
        return Ok(History {
            origin: HistoryOrigin::Simulated,
            range,
            samples: simulate(range, now, &mut rand::rng()),
        });
    }

    let channel = ChannelConfig::from_settings(settings);
    let samples = if channel.is_configured() {
        tokio::time::timeout(timeout, source.history(&channel, range.cloud_results()))
            .await
            .map_err(|_| Error::timeout("history fetch", timeout))??
    } else {
        Vec::new()
    };

    Ok(History {
        origin: HistoryOrigin::Cloud,
        range,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    #[test]
    fn test_range_parameters() {
        assert_eq!(HistoryRange::Hour.cloud_results(), 12);
        assert_eq!(HistoryRange::Day.cloud_results(), 48);
        assert_eq!(HistoryRange::Week.cloud_results(), 100);
        assert_eq!(HistoryRange::Week.simulated_points(), 7);
        assert_eq!("24h".parse::<HistoryRange>().unwrap(), HistoryRange::Day);
        assert_eq!(HistoryRange::Week.to_string(), "7D");
        assert!("2W".parse::<HistoryRange>().is_err());
    }

    #[test]
    fn test_simulated_series_shape() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples = simulate(HistoryRange::Hour, NOW, &mut rng);
        assert_eq!(samples.len(), 12);
        assert_eq!(samples.last().unwrap().timestamp, NOW);
        assert_eq!(samples[0].timestamp, NOW - time::Duration::minutes(55));
        for s in &samples {
            assert!((350.0..1750.0).contains(&s.ppm));
            assert!((22.0..24.0).contains(&s.temperature));
        }
    }

    #[test]
    fn test_summary() {
        assert_eq!(HistorySummary::from_samples(&[]), HistorySummary::default());

        let samples: Vec<_> = [400.0, 1401.0, 500.0]
            .into_iter()
            .map(|ppm| TelemetrySample {
                ppm,
                temperature: 22.0,
                humidity: 40.0,
                timestamp: NOW,
            })
            .collect();
        let summary = HistorySummary::from_samples(&samples);
        assert_eq!(summary.peak, 1401.0);
        assert_eq!(summary.average, 767.0);
        assert_eq!(summary.count, 3);
    }
}
