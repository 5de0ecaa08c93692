//! Alert notification hook.
//!
//! The core calls an [`AlertNotifier`] once per newly raised alert, and only
//! while notifications are enabled in settings. What "notify" means (a
//! vibration pattern, a terminal bell) belongs to the host.

use std::sync::Mutex;

use tracing::warn;

use smartguard_types::MeshAlert;

/// Receives newly raised alerts.
pub trait AlertNotifier: Send + Sync {
    /// Called when `alert` becomes active.
    fn notify(&self, alert: &MeshAlert);
}

/// Notifier that writes a warning to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn notify(&self, alert: &MeshAlert) {
        warn!(
            device = %alert.source_device_id,
            location = %alert.location,
            ppm = alert.ppm,
            "Emergency alert"
        );
    }
}

/// Notifier that records every alert it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<MeshAlert>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far.
    pub fn alerts(&self) -> Vec<MeshAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Number of alerts received.
    pub fn count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl AlertNotifier for RecordingNotifier {
    fn notify(&self, alert: &MeshAlert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}
