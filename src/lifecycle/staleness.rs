//! Staleness evaluation.
//!
//! A channel is stale when no activity message landed inside the lookback
//! window. Channels that are not yet older than the window are never stale.

use chrono::{Duration, Utc};
use tracing::debug;

use crate::error::TransportError;
use crate::lifecycle::classifier::{carries_marker, is_activity};
use crate::lifecycle::exclusion::exceeds_minimum_age;
use crate::policy::Policy;
use crate::transport::{ARCHIVE_MARKER, ChatTransport, Message, WARNING_MARKER, window_start};

/// Borrowing evaluator over a transport and the run's policy.
pub struct StalenessEvaluator<'a> {
    transport: &'a dyn ChatTransport,
    policy: &'a Policy,
}

impl<'a> StalenessEvaluator<'a> {
    pub fn new(transport: &'a dyn ChatTransport, policy: &'a Policy) -> Self {
        Self { transport, policy }
    }

    /// True when `channel` is strictly older than `days` days.
    ///
    /// Independent of staleness; callers that only need the age gate use
    /// this directly.
    pub async fn channel_minimum_age(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<bool, TransportError> {
        let info = self.transport.channel_info(channel).await?;
        Ok(exceeds_minimum_age(info.age_secs, days))
    }

    /// Raw history for the last `days` days, newest first.
    pub async fn recent_messages(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<Vec<Message>, TransportError> {
        let latest = Utc::now();
        let oldest = window_start(latest, Duration::days(i64::from(days)));
        self.transport.messages_in_range(channel, oldest, latest).await
    }

    /// Messages in the last `days` days that count as activity. Our own
    /// warnings and closure announcements never count, whether or not their
    /// markup was resolved.
    pub async fn activity_messages(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<Vec<Message>, TransportError> {
        let messages = self.recent_messages(channel, days).await?;
        Ok(self.filter_activity(messages))
    }

    /// Keep messages that pass the classifier and carry no lifecycle marker.
    pub fn filter_activity(&self, messages: Vec<Message>) -> Vec<Message> {
        messages
            .into_iter()
            .filter(|m| is_activity(m, self.policy))
            .filter(|m| {
                !carries_marker(m, WARNING_MARKER) && !carries_marker(m, ARCHIVE_MARKER)
            })
            .collect()
    }

    /// True when `channel` is older than `days` days and had no activity in
    /// that window.
    pub async fn is_stale(&self, channel: &str, days: u32) -> Result<bool, TransportError> {
        if !self.channel_minimum_age(channel, days).await? {
            debug!(channel, days, "Channel too young to be stale");
            return Ok(false);
        }

        let activity = self.activity_messages(channel, days).await?;
        debug!(
            channel,
            days,
            activity = activity.len(),
            "Evaluated channel staleness"
        );
        Ok(activity.is_empty())
    }
}
