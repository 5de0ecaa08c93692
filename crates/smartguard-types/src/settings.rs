//! User settings.
//!
//! A single [`UserSettings`] instance is persisted by the host. The core
//! reads it as configuration and swaps it whole on every change.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Channel id that marks the cloud channel as not yet set up.
pub const UNSET_CHANNEL_ID: &str = "0";

/// Default warning threshold in ppm.
pub const DEFAULT_WARNING_PPM: f64 = 1000.0;

/// Default danger threshold in ppm.
pub const DEFAULT_DANGER_PPM: f64 = 2500.0;

/// Colour theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// The other theme.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
        }
    }
}

impl core::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("unknown theme '{other}' (expected dark or light)")),
        }
    }
}

/// A settings validation failure scoped to one field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Field path (camelCase, as persisted).
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// User-writable configuration.
///
/// Missing fields in persisted JSON fall back to their defaults, so older
/// settings objects keep loading after new toggles are introduced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct UserSettings {
    /// Concentration (ppm) at which status becomes `Warning`.
    pub warning_threshold: f64,
    /// Concentration (ppm) at which status becomes `Danger`.
    pub danger_threshold: f64,
    /// Notify (haptic/bell) when a local alert arrives.
    pub notifications_enabled: bool,
    /// Purge old history automatically. Persisted only.
    pub auto_purge: bool,
    /// Re-establish a lost proximity link to the paired device.
    pub auto_connect: bool,
    /// Use the synthetic demo generator instead of the cloud.
    pub demo_mode: bool,
    /// Contact included in incident reports.
    pub emergency_contact: String,
    /// Colour theme.
    pub theme: Theme,
    /// Cloud telemetry channel id (`"0"` or empty when not set up).
    pub channel_id: String,
    /// Optional read key for the cloud channel.
    pub read_key: String,
    /// Alternative telemetry endpoint. Persisted only.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub endpoint_url: Option<String>,
    /// Key for the alternative endpoint. Persisted only.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub endpoint_key: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            warning_threshold: DEFAULT_WARNING_PPM,
            danger_threshold: DEFAULT_DANGER_PPM,
            notifications_enabled: true,
            auto_purge: false,
            auto_connect: false,
            demo_mode: false,
            emergency_contact: String::new(),
            theme: Theme::Dark,
            channel_id: UNSET_CHANNEL_ID.to_string(),
            read_key: String::new(),
            endpoint_url: None,
            endpoint_key: None,
        }
    }
}

impl UserSettings {
    /// Whether a cloud channel has been set up.
    ///
    /// ```
    /// use smartguard_types::UserSettings;
    ///
    /// let mut settings = UserSettings::default();
    /// assert!(!settings.has_cloud_channel());
    /// settings.channel_id = "12345".into();
    /// assert!(settings.has_cloud_channel());
    /// ```
    pub fn has_cloud_channel(&self) -> bool {
        let id = self.channel_id.trim();
        !id.is_empty() && id != UNSET_CHANNEL_ID
    }

    /// Read key, if one is set.
    pub fn read_key(&self) -> Option<&str> {
        let key = self.read_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Check the settings, returning every problem found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let warning_ok = check_threshold(
            &mut errors,
            "warningThreshold",
            self.warning_threshold,
        );
        let danger_ok = check_threshold(&mut errors, "dangerThreshold", self.danger_threshold);

        if warning_ok && danger_ok && self.warning_threshold >= self.danger_threshold {
            errors.push(ValidationError::new(
                "warningThreshold",
                format!(
                    "must be below dangerThreshold ({} >= {})",
                    self.warning_threshold, self.danger_threshold
                ),
            ));
        }

        let channel = self.channel_id.trim();
        if channel.contains(|c: char| c == '/' || c == '?' || c.is_whitespace()) {
            errors.push(ValidationError::new(
                "channelId",
                format!("'{channel}' is not a valid channel id"),
            ));
        }

        if let Some(url) = &self.endpoint_url
            && !url.trim().is_empty()
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "endpointUrl",
                "must start with http:// or https://",
            ));
        }

        errors
    }

    /// Whether changing from `self` to `next` switches the active source.
    ///
    /// A demo toggle or a channel change both count.
    pub fn source_changed(&self, next: &UserSettings) -> bool {
        self.demo_mode != next.demo_mode
            || self.channel_id.trim() != next.channel_id.trim()
            || self.read_key.trim() != next.read_key.trim()
    }
}

fn check_threshold(errors: &mut Vec<ValidationError>, field: &str, value: f64) -> bool {
    if !value.is_finite() || value <= 0.0 {
        errors.push(ValidationError::new(
            field,
            format!("must be a positive number (got {value})"),
        ));
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = UserSettings::default();
        assert_eq!(settings.warning_threshold, 1000.0);
        assert_eq!(settings.danger_threshold, 2500.0);
        assert!(settings.notifications_enabled);
        assert!(!settings.demo_mode);
        assert_eq!(settings.theme, Theme::Dark);
        assert!(!settings.has_cloud_channel());
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn test_empty_channel_is_unset() {
        let settings = UserSettings {
            channel_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(!settings.has_cloud_channel());
    }

    #[test]
    fn test_threshold_order_enforced() {
        let settings = UserSettings {
            warning_threshold: 3000.0,
            danger_threshold: 2000.0,
            ..Default::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "warningThreshold");
    }

    #[test]
    fn test_non_positive_thresholds() {
        let settings = UserSettings {
            warning_threshold: 0.0,
            danger_threshold: f64::NAN,
            ..Default::default()
        };
        let fields: Vec<_> = settings.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["warningThreshold", "dangerThreshold"]);
    }

    #[test]
    fn test_bad_channel_and_endpoint() {
        let settings = UserSettings {
            channel_id: "12/34".to_string(),
            endpoint_url: Some("ftp://example".to_string()),
            ..Default::default()
        };
        let errors = settings.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[1].to_string().starts_with("endpointUrl:"));
    }

    #[test]
    fn test_source_changed() {
        let base = UserSettings::default();
        let demo = UserSettings {
            demo_mode: true,
            ..Default::default()
        };
        let contact = UserSettings {
            emergency_contact: "+1 555 0100".to_string(),
            ..Default::default()
        };
        assert!(base.source_changed(&demo));
        assert!(!base.source_changed(&contact));
    }

    #[test]
    fn test_theme_toggle_and_parse() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!("LIGHT".parse::<Theme>(), Ok(Theme::Light));
        assert!("blue".parse::<Theme>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_camel_case_json_with_missing_fields() {
        let json = r#"{"warningThreshold":800,"dangerThreshold":2000,"demoMode":true}"#;
        let settings: UserSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.warning_threshold, 800.0);
        assert!(settings.demo_mode);
        assert!(settings.notifications_enabled);
        assert_eq!(settings.channel_id, "0");

        let out = serde_json::to_string(&settings).unwrap();
        assert!(out.contains("\"notificationsEnabled\":true"));
        assert!(!out.contains("endpointUrl"));
    }
}
