//! Visual styling utilities for the CLI.
//!
//! Every helper takes a `no_color` flag and returns plain text when it is
//! set, so output stays pipe-friendly.

use owo_colors::OwoColorize;
use smartguard_core::{ConnectionStatus, NoticeLevel, Status};

/// Battery thresholds (percentage).
pub mod battery {
    pub const LOW: u8 = 20; // Red: < 20%
    pub const MEDIUM: u8 = 40; // Yellow: 20-40%
}

/// Signal thresholds (dBm).
pub mod signal {
    pub const WEAK: i16 = -85;
    pub const FAIR: i16 = -70;
}

/// Status label, colored by severity.
pub fn format_status(status: Status, no_color: bool) -> String {
    let label = status.to_string().to_uppercase();
    if no_color {
        return label;
    }
    match status {
        Status::Safe => format!("{}", label.green().bold()),
        Status::Warning => format!("{}", label.yellow().bold()),
        Status::Danger => format!("{}", label.red().bold()),
    }
}

/// Concentration in ppm, colored by the status it maps to.
pub fn format_ppm(ppm: f64, status: Status, no_color: bool) -> String {
    let value = format!("{ppm:.0}");
    if no_color {
        return value;
    }
    match status {
        Status::Safe => format!("{}", value.green()),
        Status::Warning => format!("{}", value.yellow()),
        Status::Danger => format!("{}", value.red()),
    }
}

/// Format battery percentage with appropriate color.
pub fn format_battery(percent: u8, no_color: bool) -> String {
    if no_color {
        return format!("{percent}%");
    }

    if percent < battery::LOW {
        format!("{}%", percent.red())
    } else if percent < battery::MEDIUM {
        format!("{}%", percent.yellow())
    } else {
        format!("{}%", percent.green())
    }
}

/// Format signal strength as a bar plus the dBm value.
pub fn format_signal(dbm: i16, no_color: bool) -> String {
    let bars = if dbm >= -55 {
        4
    } else if dbm >= signal::FAIR {
        3
    } else if dbm >= signal::WEAK {
        2
    } else {
        1
    };
    let bar = format!("{}{}", "▮".repeat(bars), "▯".repeat(4 - bars));
    let text = format!("{bar} {dbm} dBm");

    if no_color {
        text
    } else if bars >= 3 {
        format!("{}", text.green())
    } else if bars == 2 {
        format!("{}", text.yellow())
    } else {
        format!("{}", text.red())
    }
}

/// Connector status with a color hint.
pub fn format_connection(status: ConnectionStatus, no_color: bool) -> String {
    let label = status.to_string();
    if no_color {
        return label;
    }
    match status {
        ConnectionStatus::Connected => format!("{}", label.green()),
        ConnectionStatus::Connecting => format!("{}", label.cyan()),
        ConnectionStatus::Disconnected => format!("{}", label.dimmed()),
        ConnectionStatus::Error => format!("{}", label.red()),
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {message}")
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format an info message.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[--] {message}")
    } else {
        format!("{} {}", "[--]".cyan(), message)
    }
}

/// Format an error message.
pub fn format_error(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {message}")
    } else {
        format!("{} {}", "[!!]".red(), message)
    }
}

/// Format a core notice by level.
pub fn format_notice(level: NoticeLevel, message: &str, no_color: bool) -> String {
    match level {
        NoticeLevel::Success => format_success(message, no_color),
        NoticeLevel::Info => format_info(message, no_color),
        NoticeLevel::Error => format_error(message, no_color),
    }
}

/// Emergency banner.
pub fn format_alert_banner(message: &str, no_color: bool) -> String {
    let text = format!("!! EMERGENCY: {message} !!");
    if no_color {
        text
    } else {
        format!("{}", text.white().on_red().bold())
    }
}

/// Format a title.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        title.to_string()
    } else {
        format!("{}", title.bold())
    }
}

/// Apply the standard table style.
pub fn apply_table_style(table: &mut tabled::Table, no_color: bool) {
    use tabled::settings::Style;
    if no_color {
        table.with(Style::ascii());
    } else {
        table.with(Style::rounded());
    }
}
