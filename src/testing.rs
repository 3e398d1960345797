//! Test doubles: an in-memory workspace and a recording report sink.
//!
//! Used by the unit tests and by `tests/lifecycle_integration.rs`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::ReaperConfig;
use crate::error::TransportError;
use crate::policy::Policy;
use crate::report::ReportSink;
use crate::transport::{
    ChannelInfo, ChannelRef, ChatTransport, Message, MessageKind, channel_link_token,
    format_slack_ts,
};

/// Author id of messages posted through [`FakeTransport`].
pub const FAKE_BOT_USER: &str = "UREAPER";

/// Slack timestamp `days` days before now.
pub fn ts_days_ago(days: i64) -> String {
    format_slack_ts(Utc::now() - Duration::days(days))
}

/// Slack timestamp `hours` hours before now.
pub fn ts_hours_ago(hours: i64) -> String {
    format_slack_ts(Utc::now() - Duration::hours(hours))
}

/// Default policy with `configure` applied, compiled without environment
/// overrides.
///
/// Panics if the resulting config does not compile.
pub fn policy(configure: impl FnOnce(&mut ReaperConfig)) -> Policy {
    let mut config = ReaperConfig::default();
    configure(&mut config);
    Policy::compile_with_env(&config, |_| None).expect("test policy compiles")
}

/// A message posted through [`FakeTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub channel: String,
    pub text: String,
    pub kind: MessageKind,
}

#[derive(Debug, Clone)]
struct FakeMember {
    id: String,
    name: String,
    restricted: bool,
}

#[derive(Debug, Clone, Default)]
struct FakeChannel {
    id: String,
    age_secs: i64,
    members: Vec<FakeMember>,
    messages: Vec<Message>,
    archived: bool,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: String,
    /// Empty matches every channel.
    channel: String,
    reason: String,
}

#[derive(Debug, Default)]
struct FakeState {
    channels: BTreeMap<String, FakeChannel>,
    posts: Vec<PostedMessage>,
    archived: Vec<String>,
    calls: HashMap<String, usize>,
    failures: Vec<InjectedFailure>,
}

/// In-memory workspace implementing [`ChatTransport`].
///
/// Posts land in channel history like real ones do, so a second run sees the
/// first run's warnings. Failures can be injected per operation and channel.
#[derive(Debug, Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a channel created `age_days` days ago.
    pub fn with_channel(self, name: &str, id: &str, age_days: i64) -> Self {
        self.lock().channels.insert(
            name.to_string(),
            FakeChannel {
                id: id.to_string(),
                age_secs: age_days * 86_400,
                ..Default::default()
            },
        );
        self
    }

    /// Add a member to an existing channel.
    pub fn with_member(self, channel: &str, id: &str, name: &str, restricted: bool) -> Self {
        if let Some(ch) = self.lock().channels.get_mut(channel) {
            ch.members.push(FakeMember {
                id: id.to_string(),
                name: name.to_string(),
                restricted,
            });
        }
        self
    }

    pub fn with_message(self, channel: &str, message: Message) -> Self {
        self.push_message(channel, message);
        self
    }

    /// Append a message to an existing channel's history.
    pub fn push_message(&self, channel: &str, message: Message) {
        if let Some(ch) = self.lock().channels.get_mut(channel) {
            ch.messages.push(message);
        }
    }

    /// Make `operation` fail for `channel` (every channel if empty).
    pub fn fail(&self, operation: &str, channel: &str, reason: &str) {
        self.lock().failures.push(InjectedFailure {
            operation: operation.to_string(),
            channel: channel.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Every post made so far, in order.
    pub fn posts(&self) -> Vec<PostedMessage> {
        self.lock().posts.clone()
    }

    pub fn posts_to(&self, channel: &str) -> Vec<PostedMessage> {
        self.lock()
            .posts
            .iter()
            .filter(|p| p.channel == channel)
            .cloned()
            .collect()
    }

    /// Channels archived so far, in order.
    pub fn archived(&self) -> Vec<String> {
        self.lock().archived.clone()
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Count the call, then apply any injected failure.
    fn enter(&self, operation: &str, channel: &str) -> Result<MutexGuard<'_, FakeState>, TransportError> {
        let mut state = self.lock();
        *state.calls.entry(operation.to_string()).or_default() += 1;
        if let Some(f) = state
            .failures
            .iter()
            .find(|f| f.operation == operation && (f.channel.is_empty() || f.channel == channel))
        {
            return Err(TransportError::Fake {
                operation: operation.to_string(),
                reason: f.reason.clone(),
            });
        }
        Ok(state)
    }
}

fn unknown(channel: &str) -> TransportError {
    TransportError::UnknownChannel {
        name: channel.to_string(),
    }
}

fn in_range(message: &Message, oldest: DateTime<Utc>, latest: DateTime<Utc>) -> bool {
    message
        .timestamp()
        .is_some_and(|at| at >= oldest && at <= latest)
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn list_channels(&self) -> Result<Vec<ChannelRef>, TransportError> {
        let state = self.enter("list_channels", "")?;
        Ok(state
            .channels
            .iter()
            .filter(|(_, ch)| !ch.archived)
            .map(|(name, ch)| ChannelRef {
                name: name.clone(),
                id: ch.id.clone(),
            })
            .collect())
    }

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        let state = self.enter("channel_info", channel)?;
        let ch = state.channels.get(channel).ok_or_else(|| unknown(channel))?;
        Ok(ChannelInfo {
            id: ch.id.clone(),
            name: channel.to_string(),
            age_secs: ch.age_secs,
            member_ids: ch.members.iter().map(|m| m.id.clone()).collect(),
            restricted_member_ids: ch
                .members
                .iter()
                .filter(|m| m.restricted)
                .map(|m| m.id.clone())
                .collect(),
        })
    }

    async fn channel_member_names(&self, channel: &str) -> Result<Vec<String>, TransportError> {
        let state = self.enter("channel_member_names", channel)?;
        let ch = state.channels.get(channel).ok_or_else(|| unknown(channel))?;
        Ok(ch.members.iter().map(|m| m.name.clone()).collect())
    }

    async fn messages_in_range(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Result<Vec<Message>, TransportError> {
        let state = self.enter("messages_in_range", channel)?;
        let ch = state.channels.get(channel).ok_or_else(|| unknown(channel))?;
        let mut messages: Vec<Message> = ch
            .messages
            .iter()
            .filter(|m| in_range(m, oldest, latest))
            .cloned()
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse(m.timestamp()));
        Ok(messages)
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<(), TransportError> {
        let mut state = self.enter("post_message", channel)?;
        let ch = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| unknown(channel))?;

        let mut message =
            Message::new(FAKE_BOT_USER, text, format_slack_ts(Utc::now())).with_subtype("bot_message");
        if let Some(marker) = kind.marker() {
            message = message.with_attachment(marker);
        }
        ch.messages.push(message);

        state.posts.push(PostedMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            kind,
        });
        Ok(())
    }

    async fn archive(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.enter("archive", channel)?;
        let ch = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| unknown(channel))?;
        if ch.archived {
            return Err(TransportError::Api {
                operation: "conversations.archive".into(),
                error: "already_archived".into(),
            });
        }
        ch.archived = true;
        state.archived.push(channel.to_string());
        Ok(())
    }

    async fn channel_markup(&self, channel: &str) -> Result<Option<String>, TransportError> {
        let state = self.enter("channel_markup", channel)?;
        Ok(state
            .channels
            .get(channel)
            .map(|ch| channel_link_token(&ch.id, channel)))
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, TransportError> {
        let state = self.enter("permalink", channel)?;
        let ch = state.channels.get(channel).ok_or_else(|| unknown(channel))?;
        Ok(format!(
            "https://example.slack.com/archives/{}/p{}",
            ch.id,
            ts.replace('.', "")
        ))
    }
}

/// Report sink that keeps everything it is told.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}
