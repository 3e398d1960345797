//! Channel exclusion gates.
//!
//! Two independent checks, both keyed on the channel name:
//! - the ignore list exempts a channel from every lifecycle action
//!   (explicit names or regex patterns);
//! - archive readiness blocks only the destructive step (guest-only
//!   channels, channels below the minimum age, and any channel before the
//!   earliest archive date).

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;
use crate::policy::Policy;
use crate::transport::ChannelInfo;

/// Sentinel used when no earliest archive date is configured.
pub const PAST_DATE_STRING: &str = "2000-01-01";

const SECONDS_PER_DAY: i64 = 86_400;

/// The sentinel as a date.
pub fn past_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

// ── Ignore list ─────────────────────────────────────────────────────

/// A single ignore pattern with its compiled regex.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    /// Pattern as written in the config.
    pub pattern: String,
    pub regex: Regex,
}

/// Names and patterns of channels that are never warned or archived.
#[derive(Debug, Clone, Default)]
pub struct ChannelIgnoreList {
    names: HashSet<String>,
    patterns: Vec<IgnorePattern>,
}

impl ChannelIgnoreList {
    /// Compile the configured names and patterns.
    pub fn new(names: &[String], patterns: &[String]) -> Result<Self, ConfigError> {
        let mut list = Self {
            names: names.iter().cloned().collect(),
            patterns: Vec::with_capacity(patterns.len()),
        };
        for pattern in patterns {
            list.add_pattern(pattern)
                .map_err(|e| ConfigError::InvalidValue {
                    key: "ignore_channel_patterns".into(),
                    message: format!("{pattern:?}: {e}"),
                })?;
        }
        Ok(list)
    }

    /// An empty list (nothing ignored).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a pattern. Matching is case-sensitive and unanchored unless the
    /// pattern anchors itself.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.patterns.push(IgnorePattern {
            pattern: pattern.into(),
            regex: Regex::new(pattern)?,
        });
        Ok(())
    }

    /// Why `channel` is ignored, or `None` if it is not.
    pub fn reason(&self, channel: &str) -> Option<String> {
        if self.names.contains(channel) {
            return Some("listed in ignore_channels".into());
        }
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(channel))
            .map(|p| format!("matches ignore pattern {:?}", p.pattern))
    }

    pub fn is_ignored(&self, channel: &str) -> bool {
        match self.reason(channel) {
            Some(reason) => {
                debug!(channel, reason = %reason, "Channel is ignored");
                true
            }
            None => false,
        }
    }
}

// ── Archive readiness ───────────────────────────────────────────────

/// Why a stale channel may not be archived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveBlock {
    /// Every member is a restricted account or guest.
    RestrictedMembersOnly,
    /// The channel is not older than the minimum age.
    BelowMinimumAge,
    /// Today precedes the earliest permitted archive date.
    BeforeEarliestArchiveDate(NaiveDate),
}

impl fmt::Display for ArchiveBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestrictedMembersOnly => write!(f, "only restricted members"),
            Self::BelowMinimumAge => write!(f, "below minimum age"),
            Self::BeforeEarliestArchiveDate(date) => {
                write!(f, "before earliest archive date {date}")
            }
        }
    }
}

/// True when a channel of `age_secs` is strictly older than `days` days.
pub fn exceeds_minimum_age(age_secs: i64, days: u32) -> bool {
    age_secs > i64::from(days) * SECONDS_PER_DAY
}

/// First reason that blocks archiving `info` on `today`, if any.
pub fn archive_block(info: &ChannelInfo, today: NaiveDate, policy: &Policy) -> Option<ArchiveBlock> {
    if info.has_only_restricted_members() {
        return Some(ArchiveBlock::RestrictedMembersOnly);
    }
    if !exceeds_minimum_age(info.age_secs, policy.min_channel_age_days) {
        return Some(ArchiveBlock::BelowMinimumAge);
    }
    if today < policy.earliest_archive_date {
        return Some(ArchiveBlock::BeforeEarliestArchiveDate(
            policy.earliest_archive_date,
        ));
    }
    None
}

/// Resolve the earliest archive date.
///
/// Priority: the environment override, then the configured value, then the
/// past-date sentinel (no restriction).
pub fn resolve_earliest_archive_date(
    env_override: Option<&str>,
    configured: Option<&str>,
) -> Result<NaiveDate, ConfigError> {
    if let Some(value) = env_override {
        return parse_date("earliest_archive_date (environment)", value);
    }
    if let Some(value) = configured.filter(|v| !v.trim().is_empty()) {
        return parse_date("earliest_archive_date", value);
    }
    Ok(past_date())
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("expected YYYY-MM-DD, got {value:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::testing;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn explicit_ignore_channel() {
        let list = ChannelIgnoreList::new(&names(&["stalinists"]), &[]).unwrap();
        assert!(list.is_ignored("stalinists"));
        assert!(!list.is_ignored("leninists"));
    }

    #[test]
    fn matching_ignore_pattern() {
        let list = ChannelIgnoreList::new(&[], &names(&["^stal"])).unwrap();
        assert!(list.is_ignored("stalinists"));
    }

    #[test]
    fn non_matching_ignore_pattern() {
        let list = ChannelIgnoreList::new(&[], &names(&["^len"])).unwrap();
        assert!(!list.is_ignored("stalinists"));
    }

    #[test]
    fn many_patterns_one_match() {
        let list = ChannelIgnoreList::new(&[], &names(&["^len", "lin", "^st"])).unwrap();
        assert!(list.is_ignored("stalinists"));
        assert!(list.reason("stalinists").unwrap().contains("lin"));
    }

    #[test]
    fn unanchored_pattern_matches_anywhere() {
        let list = ChannelIgnoreList::new(&[], &names(&["meta"])).unwrap();
        assert!(list.is_ignored("zmeta-control"));
    }

    #[test]
    fn patterns_are_case_sensitive() {
        let list = ChannelIgnoreList::new(&[], &names(&["^STAL"])).unwrap();
        assert!(!list.is_ignored("stalinists"));
    }

    #[test]
    fn empty_config_ignores_nothing() {
        let list = ChannelIgnoreList::empty();
        assert!(!list.is_ignored("stalinists"));
        assert!(list.reason("stalinists").is_none());
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = ChannelIgnoreList::new(&[], &names(&["("])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    // ── Minimum age ─────────────────────────────────────────────────

    #[test]
    fn old_channel_exceeds_minimum_age() {
        assert!(exceeds_minimum_age(86_400 * 60, 30));
    }

    #[test]
    fn exactly_minimum_age_does_not_exceed() {
        assert!(!exceeds_minimum_age(86_400 * 30, 30));
    }

    #[test]
    fn young_channel_does_not_exceed() {
        assert!(!exceeds_minimum_age(86_400, 30));
    }

    // ── Earliest archive date ───────────────────────────────────────

    #[test]
    fn env_override_wins() {
        let date = resolve_earliest_archive_date(Some("2030-05-01"), Some("2029-01-01")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2030, 5, 1).unwrap());
    }

    #[test]
    fn config_value_used_without_override() {
        let date = resolve_earliest_archive_date(None, Some("2029-01-01")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2029, 1, 1).unwrap());
    }

    #[test]
    fn falls_back_to_past_date() {
        let date = resolve_earliest_archive_date(None, None).unwrap();
        assert_eq!(
            date,
            NaiveDate::parse_from_str(PAST_DATE_STRING, "%Y-%m-%d").unwrap()
        );
    }

    #[test]
    fn invalid_date_is_rejected() {
        assert!(resolve_earliest_archive_date(Some("next tuesday"), None).is_err());
        assert!(resolve_earliest_archive_date(None, Some("2029-13-01")).is_err());
    }

    // ── Archive readiness ───────────────────────────────────────────

    fn info(age_days: i64, members: &[&str], restricted: &[&str]) -> ChannelInfo {
        ChannelInfo {
            id: "C102843".into(),
            name: "stalinists".into(),
            age_secs: age_days * 86_400,
            member_ids: members.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            restricted_member_ids: restricted.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn ready_channel_is_not_blocked() {
        let policy = testing::policy(|_| {});
        assert_eq!(archive_block(&info(90, &["U1"], &[]), today(), &policy), None);
    }

    #[test]
    fn restricted_only_channel_is_blocked() {
        let policy = testing::policy(|_| {});
        assert_eq!(
            archive_block(&info(90, &["U1", "U2"], &["U1", "U2"]), today(), &policy),
            Some(ArchiveBlock::RestrictedMembersOnly)
        );
    }

    #[test]
    fn young_channel_is_blocked() {
        let policy = testing::policy(|c| c.min_channel_age_days = 30);
        assert_eq!(
            archive_block(&info(30, &["U1"], &[]), today(), &policy),
            Some(ArchiveBlock::BelowMinimumAge)
        );
    }

    #[test]
    fn before_earliest_date_is_blocked() {
        let policy = testing::policy(|c| c.earliest_archive_date = Some("2026-10-17".into()));
        let block = archive_block(&info(90, &["U1"], &[]), today(), &policy);
        assert!(matches!(
            block,
            Some(ArchiveBlock::BeforeEarliestArchiveDate(_))
        ));
        assert!(block.unwrap().to_string().contains("2026-10-17"));
    }

    #[test]
    fn on_earliest_date_is_allowed() {
        let policy = testing::policy(|c| c.earliest_archive_date = Some("2026-10-16".into()));
        assert_eq!(archive_block(&info(90, &["U1"], &[]), today(), &policy), None);
    }
}
