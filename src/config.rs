//! Configuration types.
//!
//! Layering: defaults, then an optional JSON policy file, then environment
//! overrides. The result is compiled into a read-only
//! [`Policy`](crate::policy::Policy) before any channel is touched.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default name of the environment variable that overrides the earliest
/// archive date.
pub const DEFAULT_EARLIEST_ARCHIVE_DATE_ENV: &str = "REAPER_EARLIEST_ARCHIVE_DATE";

/// Upper bound on every day-based window.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Upper bound on the flagger lookback.
pub const MAX_FLAG_LOOKBACK_HOURS: u32 = MAX_WINDOW_DAYS * 24;

/// Default staleness warning.
pub const DEFAULT_WARNING_TEXT: &str = "Hey! This channel has not had any activity in a while. \
If it stays quiet it will be archived automatically. Post anything to keep it open.";

/// Default closure announcement. `{members}` is replaced with member names.
pub const DEFAULT_CLOSURE_TEXT: &str = "This channel is being archived for inactivity. \
Members at closing: {members}";

/// A reaction-count rule for the flagger, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRuleConfig {
    /// Name used in the posted message and in logs.
    pub label: String,
    /// Regex over reaction names, e.g. `^fire$` or `.` for any reaction.
    pub emoji: String,
    /// Summed reaction count at which a message is flagged.
    pub threshold: u32,
    /// Channel that receives flagged messages.
    pub output_channel: String,
}

/// Policy configuration, as read from file and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Gate on every side-effecting call. Off means dry run.
    pub activated: bool,
    /// Inactivity window after which a channel is warned.
    pub warn_threshold_days: u32,
    /// Inactivity window after which a channel is archived.
    pub archive_threshold_days: u32,
    /// Channels must be strictly older than this to be archived.
    pub min_channel_age_days: u32,
    /// `YYYY-MM-DD`; nothing is archived before this date.
    pub earliest_archive_date: Option<String>,
    /// Environment variable that, when set, overrides `earliest_archive_date`.
    pub earliest_archive_date_env_varname: Option<String>,
    pub ignore_channels: Vec<String>,
    pub ignore_channel_patterns: Vec<String>,
    pub ignore_users: Vec<String>,
    /// Message subtypes that count as activity. Empty means humans only.
    pub included_subtypes: Vec<String>,
    pub warning_text: String,
    pub closure_text: String,
    /// Only archive channels that already carry a staleness warning.
    pub archive_requires_warning: bool,
    /// Channel that receives run summaries. Summaries go to the log if unset.
    pub report_channel: Option<String>,
    pub flag_rules: Vec<FlagRuleConfig>,
    pub flag_lookback_hours: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            activated: false,
            warn_threshold_days: 30,
            archive_threshold_days: 60,
            min_channel_age_days: 0,
            earliest_archive_date: None,
            earliest_archive_date_env_varname: Some(DEFAULT_EARLIEST_ARCHIVE_DATE_ENV.to_string()),
            ignore_channels: Vec::new(),
            ignore_channel_patterns: Vec::new(),
            ignore_users: Vec::new(),
            included_subtypes: vec![
                "bot_message".to_string(),
                "file_share".to_string(),
                "me_message".to_string(),
                "thread_broadcast".to_string(),
            ],
            warning_text: DEFAULT_WARNING_TEXT.to_string(),
            closure_text: DEFAULT_CLOSURE_TEXT.to_string(),
            archive_requires_warning: false,
            report_channel: None,
            flag_rules: Vec::new(),
            flag_lookback_hours: 24,
        }
    }
}

impl ReaperConfig {
    /// Load defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON policy file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Apply `REAPER_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REAPER_ACTIVATED") {
            self.activated = parse_bool("REAPER_ACTIVATED", &v)?;
        }
        if let Some(v) = lookup("REAPER_WARN_THRESHOLD_DAYS") {
            self.warn_threshold_days = parse_days("REAPER_WARN_THRESHOLD_DAYS", &v)?;
        }
        if let Some(v) = lookup("REAPER_ARCHIVE_THRESHOLD_DAYS") {
            self.archive_threshold_days = parse_days("REAPER_ARCHIVE_THRESHOLD_DAYS", &v)?;
        }
        if let Some(v) = lookup("REAPER_MIN_CHANNEL_AGE_DAYS") {
            self.min_channel_age_days = parse_days("REAPER_MIN_CHANNEL_AGE_DAYS", &v)?;
        }
        if let Some(v) = lookup("REAPER_REPORT_CHANNEL") {
            let v = v.trim().trim_start_matches('#').to_string();
            self.report_channel = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = lookup("REAPER_IGNORE_CHANNELS") {
            self.ignore_channels = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    /// Reject values that cannot produce a sensible run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("warn_threshold_days", self.warn_threshold_days, 1, MAX_WINDOW_DAYS)?;
        check_range("archive_threshold_days", self.archive_threshold_days, 1, MAX_WINDOW_DAYS)?;
        check_range("min_channel_age_days", self.min_channel_age_days, 0, MAX_WINDOW_DAYS)?;
        check_range(
            "flag_lookback_hours",
            self.flag_lookback_hours,
            1,
            MAX_FLAG_LOOKBACK_HOURS,
        )?;
        if self.warning_text.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "warning_text".into(),
                message: "must not be empty".into(),
            });
        }
        for rule in &self.flag_rules {
            if rule.threshold == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("flag_rules.{}.threshold", rule.label),
                    message: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }
}

fn check_range(key: &str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key: key.into(),
        message: format!("must be between {min} and {max}, got {value}"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_days(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("expected a whole number of days: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_inactive_with_bot_messages_included() {
        let config = ReaperConfig::default();
        assert!(!config.activated);
        assert_eq!(config.warn_threshold_days, 30);
        assert_eq!(config.archive_threshold_days, 60);
        assert!(config.included_subtypes.contains(&"bot_message".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "activated": true,
                "ignore_channels": ["general", "random"],
                "ignore_channel_patterns": ["^zmeta-"],
                "flag_rules": [
                    {{ "label": "hot", "emoji": "^fire$", "threshold": 3, "output_channel": "zmeta-flagged" }}
                ]
            }}"#
        )
        .unwrap();

        let config = ReaperConfig::from_file(file.path()).unwrap();
        assert!(config.activated);
        assert_eq!(config.ignore_channels, vec!["general", "random"]);
        assert_eq!(config.flag_rules[0].output_channel, "zmeta-flagged");
        assert_eq!(config.warn_threshold_days, 30);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ReaperConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ReaperConfig::from_file(Path::new("/nonexistent/reaper.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = ReaperConfig::default();
        config
            .apply_env_overrides(lookup_from(&[
                ("REAPER_ACTIVATED", "true"),
                ("REAPER_WARN_THRESHOLD_DAYS", "14"),
                ("REAPER_REPORT_CHANNEL", "#zmeta-reaper"),
                ("REAPER_IGNORE_CHANNELS", "general, announcements,,"),
            ]))
            .unwrap();
        assert!(config.activated);
        assert_eq!(config.warn_threshold_days, 14);
        assert_eq!(config.report_channel.as_deref(), Some("zmeta-reaper"));
        assert_eq!(config.ignore_channels, vec!["general", "announcements"]);
    }

    #[test]
    fn invalid_env_override_is_rejected() {
        let mut config = ReaperConfig::default();
        let err = config
            .apply_env_overrides(lookup_from(&[("REAPER_ACTIVATED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = config
            .apply_env_overrides(lookup_from(&[("REAPER_ARCHIVE_THRESHOLD_DAYS", "-3")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let config = ReaperConfig {
            warn_threshold_days: 0,
            ..ReaperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_windows_fail_validation() {
        let config = ReaperConfig {
            flag_lookback_hours: u32::MAX,
            ..ReaperConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "flag_lookback_hours")
        );

        let config = ReaperConfig {
            archive_threshold_days: MAX_WINDOW_DAYS + 1,
            ..ReaperConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReaperConfig {
            min_channel_age_days: MAX_WINDOW_DAYS,
            flag_lookback_hours: MAX_FLAG_LOOKBACK_HOURS,
            ..ReaperConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_flag_threshold_fails_validation() {
        let config = ReaperConfig {
            flag_rules: vec![FlagRuleConfig {
                label: "any".into(),
                emoji: ".".into(),
                threshold: 0,
                output_channel: "flagged".into(),
            }],
            ..ReaperConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
