//! Lifecycle engine: warn stale channels, then archive them.
//!
//! Every decision is re-derived from live history on each run. Channels are
//! processed one at a time in name order; a transport failure on one channel
//! is logged and recorded, and the loop moves on.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::lifecycle::classifier;
use crate::lifecycle::exclusion::archive_block;
use crate::lifecycle::markup;
use crate::lifecycle::staleness::StalenessEvaluator;
use crate::lifecycle::state::{ChannelState, Outcome, RunReport};
use crate::policy::Policy;
use crate::report::ReportSink;
use crate::transport::{ARCHIVE_MARKER, ChatTransport, MessageKind};

/// Placeholder in the closure text replaced by member names.
const MEMBERS_PLACEHOLDER: &str = "{members}";

/// Orchestrates warn and archive over the workspace's channels.
pub struct LifecycleEngine {
    transport: Arc<dyn ChatTransport>,
    policy: Arc<Policy>,
    report: Arc<dyn ReportSink>,
}

impl LifecycleEngine {
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

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn evaluator(&self) -> StalenessEvaluator<'_> {
        StalenessEvaluator::new(self.transport.as_ref(), &self.policy)
    }

    // ── Predicates ──────────────────────────────────────────────────

    pub fn ignore_channel(&self, channel: &str) -> bool {
        self.policy.ignore_channel(channel)
    }

    pub async fn channel_minimum_age(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<bool, TransportError> {
        self.evaluator().channel_minimum_age(channel, days).await
    }

    pub async fn is_stale(&self, channel: &str, days: u32) -> Result<bool, TransportError> {
        self.evaluator().is_stale(channel, days).await
    }

    /// True if a staleness warning was posted to `channel` in the last
    /// `days` days.
    ///
    /// Matches the warning text as configured and, when it references other
    /// channels, as it reads once markup is resolved.
    pub async fn has_prior_warning(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<bool, TransportError> {
        let messages = self.evaluator().recent_messages(channel, days).await?;
        let warning_text = &self.policy.warning_text;
        if classifier::has_prior_warning(&messages, warning_text) {
            return Ok(true);
        }
        if self.policy.markup.references(warning_text).is_empty() {
            return Ok(false);
        }
        let resolved = self
            .policy
            .markup
            .resolve(warning_text, self.transport.as_ref())
            .await?;
        Ok(classifier::has_prior_warning(&messages, &resolved))
    }

    /// Resolve channel markup in `text` and post it.
    pub async fn post_marked_up_message(
        &self,
        channel: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<(), TransportError> {
        markup::post_marked_up_message(
            self.transport.as_ref(),
            &self.policy.markup,
            channel,
            text,
            kind,
        )
        .await
    }

    // ── Single-channel operations ───────────────────────────────────

    /// Post the staleness warning to `channel` unless one is already in the
    /// last `days` days. `force` skips that check.
    ///
    /// Staleness is the caller's concern; see [`Self::warn_all`].
    pub async fn warn(
        &self,
        channel: &str,
        days: u32,
        force: bool,
    ) -> Result<Outcome, TransportError> {
        if self.ignore_channel(channel) {
            return Ok(Outcome::Ignored);
        }

        if !force && self.has_prior_warning(channel, days).await? {
            debug!(channel, days, "Channel already warned");
            return Ok(Outcome::AlreadyWarned);
        }

        if !self.policy.activated {
            info!(channel, "Not activated; would warn channel");
            return Ok(Outcome::DryRun(ChannelState::WarningEligible));
        }

        self.post_marked_up_message(channel, &self.policy.warning_text, MessageKind::Warning)
            .await?;
        info!(channel, force, "Warned channel");
        Ok(Outcome::Warned)
    }

    /// Announce closure with the member list, then archive `channel`.
    ///
    /// No readiness checks; see [`Self::safe_archive`].
    pub async fn archive(&self, channel: &str) -> Result<Outcome, TransportError> {
        if self.ignore_channel(channel) {
            return Ok(Outcome::Ignored);
        }

        if !self.policy.activated {
            info!(channel, "Not activated; would archive channel");
            return Ok(Outcome::DryRun(ChannelState::ArchiveEligible));
        }

        let members = self.transport.channel_member_names(channel).await?;
        if self.has_closure_announcement(channel).await? {
            debug!(channel, "Closure already announced; retrying archive only");
        } else {
            let text = self.closure_text(&members);
            self.post_marked_up_message(channel, &text, MessageKind::ArchiveAnnouncement)
                .await?;
        }
        self.transport.archive(channel).await?;
        info!(channel, members = members.len(), "Archived channel");
        Ok(Outcome::Archived)
    }

    /// Archive `channel` unless the readiness gate blocks it, or unless a
    /// warning is required first and none is in the archive window.
    pub async fn safe_archive(&self, channel: &str) -> Result<Outcome, TransportError> {
        if self.ignore_channel(channel) {
            return Ok(Outcome::Ignored);
        }

        let info = self.transport.channel_info(channel).await?;
        let today = Utc::now().date_naive();
        if let Some(block) = archive_block(&info, today, &self.policy) {
            debug!(channel, reason = %block, "Archive blocked");
            return Ok(Outcome::Blocked(block));
        }

        if self.policy.archive_requires_warning
            && !self
                .has_prior_warning(channel, self.policy.archive_threshold_days)
                .await?
        {
            debug!(channel, "Archive waits for a warning");
            return Ok(Outcome::AwaitingWarning);
        }

        self.archive(channel).await
    }

    /// True if an earlier run announced closure inside the archive window
    /// but never got as far as archiving.
    async fn has_closure_announcement(&self, channel: &str) -> Result<bool, TransportError> {
        let messages = self
            .evaluator()
            .recent_messages(channel, self.policy.archive_threshold_days)
            .await?;
        Ok(messages
            .iter()
            .any(|m| classifier::carries_marker(m, ARCHIVE_MARKER)))
    }

    fn closure_text(&self, members: &[String]) -> String {
        let names = if members.is_empty() {
            "(none)".to_string()
        } else {
            members.join(", ")
        };
        if self.policy.closure_text.contains(MEMBERS_PLACEHOLDER) {
            self.policy.closure_text.replace(MEMBERS_PLACEHOLDER, &names)
        } else {
            format!("{} {names}", self.policy.closure_text)
        }
    }

    // ── Batch operations ────────────────────────────────────────────

    /// Warn every stale, non-ignored channel.
    pub async fn warn_all(&self, force: bool) -> Result<RunReport, TransportError> {
        let days = self.policy.warn_threshold_days;
        let mut report = RunReport::new(if force { "warn (forced)" } else { "warn" });

        for channel in self.channel_names().await? {
            let result = self.warn_if_stale(&channel, days, force).await;
            record(&mut report, &channel, result);
        }

        self.send_summary(&report).await;
        Ok(report)
    }

    async fn warn_if_stale(
        &self,
        channel: &str,
        days: u32,
        force: bool,
    ) -> Result<Outcome, TransportError> {
        if self.ignore_channel(channel) {
            return Ok(Outcome::Ignored);
        }
        if !self.is_stale(channel, days).await? {
            return Ok(Outcome::NotStale);
        }
        self.warn(channel, days, force).await
    }

    /// Archive every stale, non-ignored channel that passes the readiness
    /// gate.
    pub async fn safe_archive_all(&self) -> Result<RunReport, TransportError> {
        let days = self.policy.archive_threshold_days;
        let mut report = RunReport::new("archive");

        for channel in self.channel_names().await? {
            let result = self.safe_archive_if_stale(&channel, days).await;
            record(&mut report, &channel, result);
        }

        self.send_summary(&report).await;
        Ok(report)
    }

    async fn safe_archive_if_stale(
        &self,
        channel: &str,
        days: u32,
    ) -> Result<Outcome, TransportError> {
        if self.ignore_channel(channel) {
            return Ok(Outcome::Ignored);
        }
        if !self.is_stale(channel, days).await? {
            return Ok(Outcome::NotStale);
        }
        self.safe_archive(channel).await
    }

    /// List stale, non-ignored channels over `days` days. Read-only.
    pub async fn stale_channels(&self, days: u32) -> Result<RunReport, TransportError> {
        let mut report = RunReport::new(format!("stale ({days} days)"));

        for channel in self.channel_names().await? {
            let result = if self.ignore_channel(&channel) {
                Ok(Outcome::Ignored)
            } else {
                self.is_stale(&channel, days).await.map(|stale| {
                    if stale {
                        Outcome::Stale
                    } else {
                        Outcome::NotStale
                    }
                })
            };
            record(&mut report, &channel, result);
        }

        Ok(report)
    }

    async fn channel_names(&self) -> Result<Vec<String>, TransportError> {
        let mut names: Vec<String> = self
            .transport
            .list_channels()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn send_summary(&self, report: &RunReport) {
        if let Err(e) = self.report.say(&report.summary()).await {
            warn!(error = %e, "Failed to deliver run summary");
        }
    }
}

/// Record a per-channel result, logging failures.
pub(crate) fn record(report: &mut RunReport, channel: &str, result: Result<Outcome, TransportError>) {
    match result {
        Ok(outcome) => {
            debug!(channel, outcome = outcome.label(), "Channel processed");
            report.record(channel, outcome);
        }
        Err(e) => {
            warn!(channel, error = %e, "Skipping channel after transport error");
            report.record_failure(channel, e);
        }
    }
}
