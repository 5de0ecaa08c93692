//! Gas concentration thresholds and status classification.
//!
//! Status is never stored as ground truth; it is recomputed from the
//! authoritative ppm value every time telemetry, thresholds or alert
//! presence change.
//!
//! # Example
//!
//! ```
//! use smartguard_core::thresholds::{Thresholds, classify};
//! use smartguard_core::Status;
//!
//! assert_eq!(classify(999.0, 1000.0, 2500.0), Status::Safe);
//! assert_eq!(classify(1000.0, 1000.0, 2500.0), Status::Warning);
//! assert_eq!(classify(2500.0, 1000.0, 2500.0), Status::Danger);
//!
//! let thresholds = Thresholds::new(800.0, 2000.0);
//! assert_eq!(thresholds.evaluate(2600.0), Status::Danger);
//! ```

use serde::{Deserialize, Serialize};

use smartguard_types::{Status, UserSettings};

/// Classify a concentration against a warning and a danger bound.
///
/// Both bounds are inclusive, and the danger bound is checked first, so a
/// reading always lands in the most severe category it qualifies for even
/// when `warning >= danger`.
pub fn classify(ppm: f64, warning: f64, danger: f64) -> Status {
    if ppm >= danger {
        Status::Danger
    } else if ppm >= warning {
        Status::Warning
    } else {
        Status::Safe
    }
}

/// Warning/danger bounds in ppm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Concentration at which status becomes `Warning`.
    pub warning: f64,
    /// Concentration at which status becomes `Danger`.
    pub danger: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_settings(&UserSettings::default())
    }
}

impl Thresholds {
    /// Create thresholds.
    pub fn new(warning: f64, danger: f64) -> Self {
        Self { warning, danger }
    }

    /// Thresholds configured in `settings`.
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self::new(settings.warning_threshold, settings.danger_threshold)
    }

    /// Classify a concentration.
    pub fn evaluate(&self, ppm: f64) -> Status {
        classify(ppm, self.warning, self.danger)
    }
}
