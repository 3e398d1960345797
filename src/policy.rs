//! Read-only policy snapshot compiled from [`ReaperConfig`].
//!
//! Everything that needs parsing or compiling (regexes, dates) happens here,
//! once, before the first channel is evaluated.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::config::ReaperConfig;
use crate::error::ConfigError;
use crate::flagger::rules::{FlagRule, compile_rules};
use crate::lifecycle::exclusion::{ChannelIgnoreList, resolve_earliest_archive_date};
use crate::lifecycle::markup::MarkupResolver;

/// Policy for one run. Shared read-only between the engine and the flagger.
#[derive(Debug, Clone)]
pub struct Policy {
    pub activated: bool,
    pub warn_threshold_days: u32,
    pub archive_threshold_days: u32,
    pub min_channel_age_days: u32,
    pub earliest_archive_date: NaiveDate,
    pub ignore: ChannelIgnoreList,
    pub ignore_users: HashSet<String>,
    pub included_subtypes: HashSet<String>,
    pub warning_text: String,
    pub closure_text: String,
    pub archive_requires_warning: bool,
    pub report_channel: Option<String>,
    pub flag_rules: Vec<FlagRule>,
    pub flag_lookback_hours: u32,
    pub markup: MarkupResolver,
}

impl Policy {
    /// Compile `config`, reading the earliest-archive-date override from the
    /// process environment.
    pub fn compile(config: &ReaperConfig) -> Result<Self, ConfigError> {
        Self::compile_with_env(config, |key| std::env::var(key).ok())
    }

    /// Compile `config`, reading environment overrides through `lookup`.
    pub fn compile_with_env<F>(config: &ReaperConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_override = config
            .earliest_archive_date_env_varname
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .and_then(|name| lookup(name))
            .filter(|value| !value.trim().is_empty());

        let earliest_archive_date = resolve_earliest_archive_date(
            env_override.as_deref(),
            config.earliest_archive_date.as_deref(),
        )?;

        let ignore = ChannelIgnoreList::new(&config.ignore_channels, &config.ignore_channel_patterns)?;

        Ok(Self {
            activated: config.activated,
            warn_threshold_days: config.warn_threshold_days,
            archive_threshold_days: config.archive_threshold_days,
            min_channel_age_days: config.min_channel_age_days,
            earliest_archive_date,
            ignore,
            ignore_users: config.ignore_users.iter().cloned().collect(),
            included_subtypes: config.included_subtypes.iter().cloned().collect(),
            warning_text: config.warning_text.clone(),
            closure_text: config.closure_text.clone(),
            archive_requires_warning: config.archive_requires_warning,
            report_channel: config.report_channel.clone(),
            flag_rules: compile_rules(&config.flag_rules)?,
            flag_lookback_hours: config.flag_lookback_hours,
            markup: MarkupResolver::new(),
        })
    }

    /// True if `channel` is exempt from every lifecycle action.
    pub fn ignore_channel(&self, channel: &str) -> bool {
        self.ignore.is_ignored(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagRuleConfig;
    use crate::lifecycle::exclusion::past_date;

    #[test]
    fn compiles_default_config() {
        let policy = Policy::compile_with_env(&ReaperConfig::default(), |_| None).unwrap();
        assert!(!policy.activated);
        assert_eq!(policy.earliest_archive_date, past_date());
        assert!(policy.included_subtypes.contains("bot_message"));
        assert!(!policy.ignore_channel("general"));
    }

    #[test]
    fn invalid_ignore_pattern_is_a_config_error() {
        let config = ReaperConfig {
            ignore_channel_patterns: vec!["(unclosed".into()],
            ..ReaperConfig::default()
        };
        let err = Policy::compile_with_env(&config, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn invalid_flag_rule_pattern_is_a_config_error() {
        let config = ReaperConfig {
            flag_rules: vec![FlagRuleConfig {
                label: "broken".into(),
                emoji: "[".into(),
                threshold: 1,
                output_channel: "flagged".into(),
            }],
            ..ReaperConfig::default()
        };
        assert!(Policy::compile_with_env(&config, |_| None).is_err());
    }

    #[test]
    fn env_override_name_is_configurable() {
        let config = ReaperConfig {
            earliest_archive_date_env_varname: Some("CUSTOM_ARCHIVE_DATE".into()),
            earliest_archive_date: Some("2031-01-01".into()),
            ..ReaperConfig::default()
        };
        let policy = Policy::compile_with_env(&config, |key| {
            (key == "CUSTOM_ARCHIVE_DATE").then(|| "2032-06-15".to_string())
        })
        .unwrap();
        assert_eq!(
            policy.earliest_archive_date,
            NaiveDate::from_ymd_opt(2032, 6, 15).unwrap()
        );
    }

    #[test]
    fn unset_env_override_name_uses_config_value() {
        let config = ReaperConfig {
            earliest_archive_date_env_varname: None,
            earliest_archive_date: Some("2031-01-01".into()),
            ..ReaperConfig::default()
        };
        let policy =
            Policy::compile_with_env(&config, |_| Some("2099-01-01".to_string())).unwrap();
        assert_eq!(
            policy.earliest_archive_date,
            NaiveDate::from_ymd_opt(2031, 1, 1).unwrap()
        );
    }
}
