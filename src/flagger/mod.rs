//! Flagger: surfaces well-reacted messages into output channels.
//!
//! Uses the same activity classification as the lifecycle engine. Each
//! message is announced at most once per rule: before posting, the output
//! channel's recent history is checked for an earlier flag of the same link.

pub mod rules;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::lifecycle::classifier::{carries_marker, is_activity};
use crate::lifecycle::engine::record;
use crate::lifecycle::markup;
use crate::lifecycle::state::{ChannelState, Outcome, RunReport};
use crate::policy::Policy;
use crate::report::ReportSink;
use crate::transport::{ChatTransport, FLAG_MARKER, MessageKind, window_start};

pub use rules::{FlagRule, compile_rules};

/// Extra history scanned in output channels so a flag posted late in the
/// previous run is still seen.
const DEDUP_SLACK_HOURS: i64 = 24;

pub struct Flagger {
    transport: Arc<dyn ChatTransport>,
    policy: Arc<Policy>,
    report: Arc<dyn ReportSink>,
}

/// Flag posts already present in each output channel, fetched on first use.
#[derive(Default)]
struct PostedFlags {
    by_channel: HashMap<String, Vec<String>>,
}

impl Flagger {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        policy: Arc<Policy>,
        report: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            transport,
            policy,
            report,
        }
    }

    /// Scan every eligible channel and flag messages that satisfy a rule.
    pub async fn flag(&self) -> Result<RunReport, TransportError> {
        let mut report = RunReport::new("flag");
        if self.policy.flag_rules.is_empty() {
            info!("No flag rules configured");
        }

        let outputs: BTreeSet<&str> = self
            .policy
            .flag_rules
            .iter()
            .map(|r| r.output_channel.as_str())
            .collect();

        let mut channels: Vec<String> = self
            .transport
            .list_channels()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        channels.sort();
        channels.dedup();

        let mut posted = PostedFlags::default();
        for channel in channels {
            if self.policy.ignore_channel(&channel) || outputs.contains(channel.as_str()) {
                report.record(&channel, Outcome::Ignored);
                continue;
            }
            let result = self.flag_channel(&channel, &mut posted).await;
            record(&mut report, &channel, result);
        }

        if let Err(e) = self.report.say(&report.summary()).await {
            warn!(error = %e, "Failed to deliver run summary");
        }
        Ok(report)
    }

    async fn flag_channel(
        &self,
        channel: &str,
        posted: &mut PostedFlags,
    ) -> Result<Outcome, TransportError> {
        let latest = Utc::now();
        let oldest = window_start(
            latest,
            Duration::hours(i64::from(self.policy.flag_lookback_hours)),
        );
        let messages = self
            .transport
            .messages_in_range(channel, oldest, latest)
            .await?;

        let mut flagged = 0;
        let mut pending = 0;
        for message in messages.iter().filter(|m| is_activity(m, &self.policy)) {
            for rule in self.policy.flag_rules.iter().filter(|r| r.matches(message)) {
                let link = self.transport.permalink(channel, &message.ts).await?;
                if self.already_flagged(posted, rule, &link).await? {
                    debug!(channel, rule = %rule.label, "Message already flagged");
                    continue;
                }

                if !self.policy.activated {
                    info!(channel, rule = %rule.label, link = %link, "Not activated; would flag message");
                    pending += 1;
                    continue;
                }

                let text = format!("{}: {link} in #{channel}", rule.label);
                markup::post_marked_up_message(
                    self.transport.as_ref(),
                    &self.policy.markup,
                    &rule.output_channel,
                    &text,
                    MessageKind::Flag,
                )
                .await?;
                info!(
                    channel,
                    rule = %rule.label,
                    emoji = %rule.emoji_pattern,
                    output = %rule.output_channel,
                    "Flagged message"
                );
                posted
                    .by_channel
                    .entry(rule.output_channel.clone())
                    .or_default()
                    .push(text);
                flagged += 1;
            }
        }

        if pending > 0 {
            return Ok(Outcome::DryRun(ChannelState::Active));
        }
        Ok(Outcome::Flagged(flagged))
    }

    async fn already_flagged(
        &self,
        posted: &mut PostedFlags,
        rule: &FlagRule,
        link: &str,
    ) -> Result<bool, TransportError> {
        if !posted.by_channel.contains_key(&rule.output_channel) {
            let latest = Utc::now();
            let hours = i64::from(self.policy.flag_lookback_hours) + DEDUP_SLACK_HOURS;
            let oldest = window_start(latest, Duration::hours(hours));
            let texts = self
                .transport
                .messages_in_range(&rule.output_channel, oldest, latest)
                .await?
                .into_iter()
                .filter(|m| carries_marker(m, FLAG_MARKER))
                .map(|m| m.text)
                .collect();
            posted.by_channel.insert(rule.output_channel.clone(), texts);
        }

        let prefix = format!("{}: ", rule.label);
        Ok(posted
            .by_channel
            .get(&rule.output_channel)
            .is_some_and(|texts| {
                texts
                    .iter()
                    .any(|t| t.starts_with(&prefix) && t.contains(link))
            }))
    }
}
