//! Shared types for the chat transport.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Messages ────────────────────────────────────────────────────────

/// A channel message as returned by the history endpoint.
///
/// Field names follow the Slack wire format so history pages deserialize
/// straight into this struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author id. Absent on some system and integration posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    /// Slack timestamp, `"<seconds>.<micros>"`. Doubles as the message id.
    #[serde(default)]
    pub ts: String,
    /// `None` for an ordinary human message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<Edited>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

/// Edit record attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edited {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

/// Message attachment. Only the fallback text matters here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// An emoji reaction and how many people added it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

impl Message {
    /// Plain human message from `user`.
    pub fn new(user: impl Into<String>, text: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            text: text.into(),
            ts: ts.into(),
            ..Default::default()
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_attachment(mut self, fallback: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            fallback: Some(fallback.into()),
        });
        self
    }

    pub fn with_reaction(mut self, name: impl Into<String>, count: u32) -> Self {
        self.reactions.push(Reaction {
            name: name.into(),
            count,
        });
        self
    }

    /// Parse `ts` into an instant. `None` when the timestamp is malformed.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_slack_ts(&self.ts)
    }

    /// Author of the most recent edit, if any.
    pub fn edited_by(&self) -> Option<&str> {
        self.edited.as_ref().and_then(|e| e.user.as_deref())
    }
}

/// Parse a Slack `"<secs>.<micros>"` timestamp.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match ts.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (ts, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = if frac.is_empty() {
        0
    } else {
        // Right-pad or truncate to six digits of microseconds.
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
        digits.parse().ok()?
    };
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Format an instant as a Slack timestamp.
pub fn format_slack_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// Start of a history window reaching `span` back from `latest`.
///
/// Saturates at the Unix epoch; there is no chat history before it.
pub fn window_start(latest: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    latest
        .checked_sub_signed(span)
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |start| {
            start.max(DateTime::<Utc>::UNIX_EPOCH)
        })
}

// ── Message kinds ───────────────────────────────────────────────────

/// Kind tag for messages posted by this tool.
///
/// Non-ordinary kinds travel as the fallback text of a single attachment so
/// later runs can recognise their own posts in channel history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ordinary,
    Warning,
    ArchiveAnnouncement,
    Flag,
}

/// Marker carried by staleness warnings.
pub const WARNING_MARKER: &str = "channel_warning";
/// Marker carried by closure announcements.
pub const ARCHIVE_MARKER: &str = "channel_archive";
/// Marker carried by flagger posts.
pub const FLAG_MARKER: &str = "flagged_message";

impl MessageKind {
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Self::Ordinary => None,
            Self::Warning => Some(WARNING_MARKER),
            Self::ArchiveAnnouncement => Some(ARCHIVE_MARKER),
            Self::Flag => Some(FLAG_MARKER),
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Warning => "warning",
            Self::ArchiveAnnouncement => "archive_announcement",
            Self::Flag => "flag",
        }
    }
}

// ── Channels ────────────────────────────────────────────────────────

/// Current name and stable id of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub name: String,
    pub id: String,
}

/// Channel metadata needed by the archive-readiness gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    /// Seconds since the channel was created.
    pub age_secs: i64,
    pub member_ids: BTreeSet<String>,
    /// Members flagged as restricted or single-channel guests.
    pub restricted_member_ids: BTreeSet<String>,
}

impl ChannelInfo {
    /// True when the channel has members and every one of them is restricted.
    ///
    /// An empty channel has nobody to protect, so it does not count.
    pub fn has_only_restricted_members(&self) -> bool {
        !self.member_ids.is_empty()
            && self
                .member_ids
                .iter()
                .all(|id| self.restricted_member_ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slack_timestamp_with_micros() {
        let at = parse_slack_ts("1355517523.000005").unwrap();
        assert_eq!(at.timestamp(), 1_355_517_523);
        assert_eq!(at.timestamp_subsec_micros(), 5);
    }

    #[test]
    fn parses_slack_timestamp_without_fraction() {
        let at = parse_slack_ts("1403051575").unwrap();
        assert_eq!(at.timestamp(), 1_403_051_575);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_slack_ts("yesterday").is_none());
        assert!(parse_slack_ts("").is_none());
    }

    #[test]
    fn window_start_saturates_at_the_epoch() {
        let now = Utc::now();
        assert_eq!(window_start(now, Duration::hours(2)), now - Duration::hours(2));
        assert_eq!(
            window_start(now, Duration::days(i64::from(u32::MAX))),
            DateTime::<Utc>::UNIX_EPOCH
        );
        assert_eq!(
            window_start(now, Duration::hours(i64::from(u32::MAX))),
            DateTime::<Utc>::UNIX_EPOCH
        );
    }

    #[test]
    fn formatted_timestamp_parses_back() {
        let at = parse_slack_ts("1496855882.185855").unwrap();
        assert_eq!(format_slack_ts(at), "1496855882.185855");
    }

    #[test]
    fn message_decodes_from_history_payload() {
        let raw = serde_json::json!({
            "type": "message",
            "channel": "C2147483705",
            "user": "U2147483697",
            "text": "Human human human.",
            "ts": "1355517523.000005",
            "edited": { "user": "U2147483697", "ts": "1355517536.000001" }
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.user.as_deref(), Some("U2147483697"));
        assert_eq!(msg.edited_by(), Some("U2147483697"));
        assert!(msg.subtype.is_none());
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn message_kind_markers() {
        assert_eq!(MessageKind::Ordinary.marker(), None);
        assert_eq!(MessageKind::Warning.marker(), Some("channel_warning"));
        assert_eq!(
            MessageKind::ArchiveAnnouncement.marker(),
            Some("channel_archive")
        );
        assert_eq!(MessageKind::Flag.label(), "flag");
    }

    fn info(members: &[&str], restricted: &[&str]) -> ChannelInfo {
        ChannelInfo {
            id: "C1".into(),
            name: "general".into(),
            age_secs: 0,
            member_ids: members.iter().map(|s| s.to_string()).collect(),
            restricted_member_ids: restricted.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn only_restricted_members_requires_everyone_restricted() {
        assert!(info(&["U1", "U2"], &["U1", "U2"]).has_only_restricted_members());
        assert!(!info(&["U1", "U2"], &["U1"]).has_only_restricted_members());
        assert!(!info(&[], &[]).has_only_restricted_members());
    }
}
