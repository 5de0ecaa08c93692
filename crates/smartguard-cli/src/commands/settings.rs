//! Settings command implementation.

use anyhow::{Context, Result, bail};
use smartguard_core::{Theme, UserSettings};
use smartguard_store::Store;

use crate::cli::{OutputFormat, SettingsAction};
use crate::format::{as_json, format_settings_text, redacted_settings};
use crate::style;
use crate::util::{parse_bool, write_output};

pub fn cmd_settings(store: &Store, action: SettingsAction, no_color: bool) -> Result<()> {
    match action {
        SettingsAction::Show { format } => {
            let settings = store.load_settings()?;
            let content = match format {
                OutputFormat::Json => as_json(&redacted_settings(&settings))?,
                OutputFormat::Text => format_settings_text(&settings),
                OutputFormat::Csv => bail!("CSV output is not supported for settings"),
            };
            write_output(None, &content)
        }
        SettingsAction::Set { key, value } => {
            let mut settings = store.load_settings()?;
            apply(&mut settings, &key, &value)?;
            check(&settings)?;
            store.save_settings(&settings)?;
            println!(
                "{}",
                style::format_success(&format!("{key} updated."), no_color)
            );
            Ok(())
        }
        SettingsAction::Reset => {
            store.save_settings(&UserSettings::default())?;
            println!(
                "{}",
                style::format_success("Settings restored to defaults.", no_color)
            );
            Ok(())
        }
    }
}

/// Reject settings that fail validation, listing every problem.
fn check(settings: &UserSettings) -> Result<()> {
    let errors = settings.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let problems: Vec<String> = errors.iter().map(ToString::to_string).collect();
    bail!("Invalid settings: {}", problems.join("; "))
}

fn parse_ppm(value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .with_context(|| format!("'{value}' is not a number"))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Apply one `key = value` change.
fn apply(settings: &mut UserSettings, key: &str, value: &str) -> Result<()> {
    match key.to_ascii_lowercase().replace('_', "-").as_str() {
        "warning" | "warning-threshold" => settings.warning_threshold = parse_ppm(value)?,
        "danger" | "danger-threshold" => settings.danger_threshold = parse_ppm(value)?,
        "notifications" => settings.notifications_enabled = parse_bool(value)?,
        "auto-purge" => settings.auto_purge = parse_bool(value)?,
        "auto-connect" => settings.auto_connect = parse_bool(value)?,
        "demo" | "demo-mode" => settings.demo_mode = parse_bool(value)?,
        "contact" | "emergency-contact" => settings.emergency_contact = value.trim().to_string(),
        "theme" => {
            settings.theme = value.parse::<Theme>().map_err(anyhow::Error::msg)?;
        }
        "channel" | "channel-id" => {
            settings.channel_id = optional(value).unwrap_or_else(|| "0".to_string());
        }
        "read-key" => settings.read_key = value.trim().to_string(),
        "endpoint-url" => settings.endpoint_url = optional(value),
        "endpoint-key" => settings.endpoint_key = optional(value),
        other => bail!(
            "Unknown setting '{other}'. Expected one of: warning, danger, notifications, \
             auto-purge, auto-connect, demo, contact, theme, channel, read-key, \
             endpoint-url, endpoint-key"
        ),
    }
    Ok(())
}
