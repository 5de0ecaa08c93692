//! Synthetic telemetry for demo mode.
//!
//! Each tick produces a sample jittered around indoor baselines. With a
//! small probability per tick, and only while no alert is active, the tick
//! also carries a synthetic emergency from a fixed demo node so the alert
//! path can be exercised without hardware.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;

use smartguard_types::{MeshAlert, TelemetrySample};

/// Default interval between demo ticks.
pub const DEFAULT_DEMO_INTERVAL: Duration = Duration::from_secs(3);

/// Default per-tick probability of a synthetic alert.
pub const DEFAULT_ALERT_PROBABILITY: f64 = 0.05;

/// Device id used for synthetic alerts.
pub const DEMO_DEVICE_ID: &str = "SmartGuard-Node-01";

/// Location used for synthetic alerts.
pub const DEMO_LOCATION: &str = "Demo Lab";

const BASE_PPM: f64 = 420.0;
const PPM_JITTER: f64 = 80.0;
const BASE_TEMP: f64 = 22.5;
const TEMP_JITTER: f64 = 1.5;
const BASE_HUMIDITY: f64 = 45.0;
const HUMIDITY_JITTER: f64 = 5.0;
const ALERT_PPM_MIN: f64 = 2800.0;
const ALERT_PPM_MAX: f64 = 4200.0;

/// Output of one demo tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoTick {
    /// Synthetic gateway sample.
    pub sample: TelemetrySample,
    /// Synthetic emergency, if one fired on this tick.
    pub alert: Option<MeshAlert>,
}

/// Random source for demo data.
#[derive(Debug, Clone)]
pub struct DemoGenerator {
    rng: StdRng,
    alert_probability: f64,
}

impl DemoGenerator {
    /// Generator seeded from the OS.
    pub fn new(alert_probability: f64) -> Self {
        Self::with_rng(StdRng::from_os_rng(), alert_probability)
    }

    /// Deterministic generator.
    pub fn seeded(seed: u64, alert_probability: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), alert_probability)
    }

    fn with_rng(rng: StdRng, alert_probability: f64) -> Self {
        let alert_probability = if alert_probability.is_finite() {
            alert_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            rng,
            alert_probability,
        }
    }

    /// Per-tick alert probability.
    pub fn alert_probability(&self) -> f64 {
        self.alert_probability
    }

    /// Produce a synthetic sample stamped `now`.
    pub fn sample(&mut self, now: OffsetDateTime) -> TelemetrySample {
        TelemetrySample {
            ppm: jitter(&mut self.rng, BASE_PPM, PPM_JITTER).max(0.0),
            temperature: jitter(&mut self.rng, BASE_TEMP, TEMP_JITTER),
            humidity: jitter(&mut self.rng, BASE_HUMIDITY, HUMIDITY_JITTER).clamp(0.0, 100.0),
            timestamp: now,
        }
    }

    /// Run one tick. The alert roll only happens when `alert_active` is false.
    pub fn tick(&mut self, alert_active: bool, now: OffsetDateTime) -> DemoTick {
        let sample = self.sample(now);
        let alert = (!alert_active && self.rng.random_bool(self.alert_probability)).then(|| {
            MeshAlert {
                source_device_id: DEMO_DEVICE_ID.to_string(),
                location: DEMO_LOCATION.to_string(),
                ppm: self.rng.random_range(ALERT_PPM_MIN..ALERT_PPM_MAX).round(),
                observed_at: now,
            }
        });
        DemoTick { sample, alert }
    }
}

fn jitter(rng: &mut StdRng, base: f64, spread: f64) -> f64 {
    base + rng.random_range(-spread..=spread)
}
