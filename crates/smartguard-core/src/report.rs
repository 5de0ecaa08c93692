//! Plain-text incident report for sharing.

use core::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use smartguard_types::Status;

use crate::reconcile::SafetySnapshot;

/// A composed incident report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentReport {
    /// Status at composition time.
    pub status: Status,
    /// Full text.
    pub text: String,
}

impl IncidentReport {
    /// Compose a report from `snapshot` at `now`.
    pub fn compose(snapshot: &SafetySnapshot, now: OffsetDateTime) -> Self {
        let mut lines = vec![
            "SMARTGUARD INCIDENT REPORT".to_string(),
            format!("Time: {}", rfc3339(now)),
            format!("Status: {}", snapshot.status.to_string().to_uppercase()),
            format!("Source: {}", snapshot.data_source),
            format!("Gas: {:.0} ppm", snapshot.display.ppm),
        ];

        if let (Some(t), Some(h)) = (snapshot.display.temperature, snapshot.display.humidity)
            && snapshot.has_data()
        {
            lines.push(format!("Environment: {t:.1} C, {h:.0}% RH"));
        }

        if let Some(alert) = &snapshot.alert {
            lines.push(format!(
                "Alert: {} at {} ({:.0} ppm, {})",
                alert.source_device_id,
                alert.location,
                alert.ppm,
                rfc3339(alert.observed_at)
            ));
        }

        let in_danger: Vec<String> = snapshot
            .nodes
            .iter()
            .filter(|n| n.status == Status::Danger)
            .map(|n| format!("{} ({}, {:.0} ppm)", n.name, n.location, n.ppm))
            .collect();
        if in_danger.is_empty() {
            lines.push("Nodes in danger: none".to_string());
        } else {
            lines.push(format!("Nodes in danger: {}", in_danger.join("; ")));
        }

        lines.push(match snapshot.display.captured_at {
            Some(at) => format!("Last reading: {}", rfc3339(at)),
            None => "Last reading: no data yet".to_string(),
        });

        let contact = snapshot.settings.emergency_contact.trim();
        lines.push(format!(
            "Emergency contact: {}",
            if contact.is_empty() { "not set" } else { contact }
        ));

        Self {
            status: snapshot.status,
            text: lines.join("\n"),
        }
    }
}

impl fmt::Display for IncidentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::PairedDevice;
    use crate::reconcile::SafetyState;
    use smartguard_types::{MeshPacket, UserSettings};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:30 UTC);

    #[test]
    fn test_report_with_alert() {
        let settings = UserSettings {
            emergency_contact: "+1 555 0100".to_string(),
            ..Default::default()
        };
        let mut state = SafetyState::new(settings, Vec::new());
        state.mesh_linked(PairedDevice::new("AA:BB", None));
        state.apply_packet(
            MeshPacket::Alert {
                device_id: "X1".to_string(),
                ppm: 3150.0,
                location: "Boiler Room".to_string(),
            },
            datetime!(2026-03-01 12:29 UTC),
        );

        let report = IncidentReport::compose(&state.snapshot(), NOW);
        assert_eq!(report.status, Status::Danger);
        let text = report.to_string();
        assert!(text.starts_with("SMARTGUARD INCIDENT REPORT\nTime: 2026-03-01T12:30:00Z"));
        assert!(text.contains("Status: DANGER"));
        assert!(text.contains("Source: local-mesh"));
        assert!(text.contains("Alert: X1 at Boiler Room (3150 ppm, 2026-03-01T12:29:00Z)"));
        assert!(text.contains("Nodes in danger: X1 (Boiler Room, 3150 ppm)"));
        assert!(text.contains("Emergency contact: +1 555 0100"));
        assert!(!text.contains("Environment:"));
    }

    #[test]
    fn test_report_without_data() {
        let state = SafetyState::new(UserSettings::default(), Vec::new());
        let text = IncidentReport::compose(&state.snapshot(), NOW).text;
        assert!(text.contains("Status: SAFE"));
        assert!(text.contains("Nodes in danger: none"));
        assert!(text.contains("Last reading: no data yet"));
        assert!(text.contains("Emergency contact: not set"));
    }
}
