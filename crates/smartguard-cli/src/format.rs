//! Output formatting for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use smartguard_core::{
    DeviceNode, History, SafetyEvent, SafetySnapshot, Status, Thresholds, UserSettings,
};

use crate::style;

/// Serialize value to a pretty JSON string with a trailing newline.
pub fn as_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

/// Serialize value to a single JSON line.
pub fn as_json_line<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)? + "\n")
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

fn since(at: Option<OffsetDateTime>, now: OffsetDateTime) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = (now - at).whole_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s ago"),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

/// Multi-line dashboard view of a snapshot.
pub fn format_snapshot_text(snapshot: &SafetySnapshot, no_color: bool) -> String {
    let mut out = String::new();

    if let Some(alert) = &snapshot.alert {
        let message = format!(
            "{} at {} reports {:.0} ppm",
            alert.source_device_id, alert.location, alert.ppm
        );
        out.push_str(&style::format_alert_banner(&message, no_color));
        out.push('\n');
    }

    out.push_str(&format!(
        "Status:  {}   Source: {}   Link: {}\n",
        style::format_status(snapshot.status, no_color),
        snapshot.data_source,
        style::format_connection(snapshot.connection.status(), no_color),
    ));

    if snapshot.has_data() {
        out.push_str(&format!(
            "Gas:     {} ppm",
            style::format_ppm(snapshot.display.ppm, snapshot.status, no_color)
        ));
        if let (Some(t), Some(h)) = (snapshot.display.temperature, snapshot.display.humidity) {
            out.push_str(&format!("   {t:.1} C   {h:.0}% RH"));
        }
        out.push('\n');
    } else {
        out.push_str("Gas:     waiting for data\n");
    }

    out.push_str(&format!(
        "Cloud:   {}   Mesh: {}",
        style::format_connection(snapshot.source_status, no_color),
        style::format_connection(snapshot.mesh_status, no_color),
    ));
    if let Some(device) = &snapshot.paired_device {
        out.push_str(&format!(" ({})", device.label()));
    }
    out.push('\n');

    if snapshot.any_node_in_danger {
        let names: Vec<&str> = snapshot
            .nodes
            .iter()
            .filter(|n| n.status == Status::Danger)
            .map(|n| n.name.as_str())
            .collect();
        out.push_str(&format!("Nodes in danger: {}\n", names.join(", ")));
    }

    out
}

/// Single status line for streaming output.
pub fn format_snapshot_line(snapshot: &SafetySnapshot, no_color: bool) -> String {
    let reading = if snapshot.has_data() {
        format!(
            "{} ppm",
            style::format_ppm(snapshot.display.ppm, snapshot.status, no_color)
        )
    } else {
        "-- ppm".to_string()
    };
    format!(
        "[{}] {} via {}",
        style::format_status(snapshot.status, no_color),
        reading,
        snapshot.data_source
    )
}

/// Text for an event, or `None` for events the dashboard line already shows.
pub fn format_event_text(event: &SafetyEvent, no_color: bool) -> Option<String> {
    let text = match event {
        SafetyEvent::AlertRaised { alert } => style::format_alert_banner(
            &format!(
                "{} at {} reports {:.0} ppm",
                alert.source_device_id, alert.location, alert.ppm
            ),
            no_color,
        ),
        SafetyEvent::AlertCleared { alert } => style::format_info(
            &format!("Alert from {} silenced.", alert.source_device_id),
            no_color,
        ),
        SafetyEvent::Notice { level, message } => style::format_notice(*level, message, no_color),
        SafetyEvent::ReconnectStarted { device, attempt } => style::format_info(
            &format!("Re-linking to {device} (attempt {attempt})..."),
            no_color,
        ),
        SafetyEvent::ThemeChanged { theme } => {
            style::format_info(&format!("Theme set to {theme}."), no_color)
        }
        SafetyEvent::NodeUpdated {
            node,
            created: true,
        } => style::format_info(
            &format!("New node {} ({}) joined.", node.name, node.location),
            no_color,
        ),
        _ => return None,
    };
    Some(text)
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "PPM")]
    ppm: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

/// Table of nodes.
pub fn format_nodes_text(nodes: &[DeviceNode], now: OffsetDateTime, no_color: bool) -> String {
    if nodes.is_empty() {
        return "No nodes registered.\n".to_string();
    }

    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            id: n.id.clone(),
            name: n.name.clone(),
            location: n.location.clone(),
            role: n.role.to_string(),
            ppm: style::format_ppm(n.ppm, n.status, no_color),
            status: style::format_status(n.status, no_color),
            battery: style::format_battery(n.battery, no_color),
            signal: style::format_signal(n.signal, no_color),
            last_seen: since(n.last_seen, now),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table, no_color);
    format!("{table}\n")
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "PPM")]
    ppm: String,
    #[tabled(rename = "Temp (C)")]
    temperature: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
}

/// Table of a history series followed by its summary.
pub fn format_history_text(
    history: &History,
    settings: &UserSettings,
    no_color: bool,
) -> String {
    if history.is_empty() {
        return format!("No {} history available.\n", history.range);
    }

    let thresholds = Thresholds::from_settings(settings);
    let rows: Vec<HistoryRow> = history
        .samples
        .iter()
        .map(|s| HistoryRow {
            time: timestamp(s.timestamp),
            ppm: style::format_ppm(s.ppm, thresholds.evaluate(s.ppm), no_color),
            temperature: format!("{:.1}", s.temperature),
            humidity: format!("{:.0}%", s.humidity),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table, no_color);

    let summary = history.summary();
    format!(
        "{}\n{table}\nPeak: {:.0} ppm   Average: {:.0} ppm   Points: {}\n",
        style::format_title(
            &format!("{} history ({:?})", history.range, history.origin),
            no_color
        ),
        summary.peak,
        summary.average,
        summary.count,
    )
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn mask(secret: &str) -> String {
    let secret = secret.trim();
    match secret.chars().count() {
        0 => "(none)".to_string(),
        n if n <= 4 => "*".repeat(n),
        n => {
            let tail: String = secret.chars().skip(n - 4).collect();
            format!("{}{tail}", "*".repeat(n - 4))
        }
    }
}

/// Settings as aligned key/value lines, with secrets masked.
pub fn format_settings_text(settings: &UserSettings) -> String {
    let channel = if settings.has_cloud_channel() {
        settings.channel_id.trim().to_string()
    } else {
        "(not set)".to_string()
    };
    let contact = settings.emergency_contact.trim();

    let rows = [
        ("warning", format!("{} ppm", settings.warning_threshold)),
        ("danger", format!("{} ppm", settings.danger_threshold)),
        ("notifications", on_off(settings.notifications_enabled).to_string()),
        ("auto-purge", on_off(settings.auto_purge).to_string()),
        ("auto-connect", on_off(settings.auto_connect).to_string()),
        ("demo", on_off(settings.demo_mode).to_string()),
        (
            "contact",
            if contact.is_empty() { "(none)".to_string() } else { contact.to_string() },
        ),
        ("theme", settings.theme.to_string()),
        ("channel", channel),
        ("read-key", mask(&settings.read_key)),
        (
            "endpoint-url",
            settings.endpoint_url.clone().unwrap_or_else(|| "(none)".to_string()),
        ),
        (
            "endpoint-key",
            mask(settings.endpoint_key.as_deref().unwrap_or_default()),
        ),
    ];

    rows.iter()
        .map(|(key, value)| format!("{key:<14} {value}\n"))
        .collect()
}

/// Settings for JSON output, with secrets masked.
pub fn redacted_settings(settings: &UserSettings) -> UserSettings {
    let mut redacted = settings.clone();
    if !redacted.read_key.trim().is_empty() {
        redacted.read_key = mask(&redacted.read_key);
    }
    if let Some(key) = redacted.endpoint_key.as_mut() {
        *key = mask(key);
    }
    redacted
}
