//! Per-run channel states, outcomes and the run report.
//!
//! None of this is persisted. Every run re-derives it from live history.

use std::fmt;

use crate::error::TransportError;
use crate::lifecycle::exclusion::ArchiveBlock;

/// Where a channel sits in the warn-then-archive lifecycle for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Active,
    WarningEligible,
    Warned,
    ArchiveEligible,
    Archived,
    Ignored,
}

impl ChannelState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::WarningEligible => "warning_eligible",
            Self::Warned => "warned",
            Self::ArchiveEligible => "archive_eligible",
            Self::Archived => "archived",
            Self::Ignored => "ignored",
        }
    }
}

/// What one lifecycle operation did (or would have done) to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exempt through the ignore list.
    Ignored,
    /// Recent activity found.
    NotStale,
    /// Stale; reported by the read-only `stale` listing.
    Stale,
    /// A warning is already in the window.
    AlreadyWarned,
    /// Warning posted.
    Warned,
    /// Stale, but archiving waits for a warning first.
    AwaitingWarning,
    /// Stale, but the archive-readiness gate said no.
    Blocked(ArchiveBlock),
    /// Closure announcement posted and channel archived.
    Archived,
    /// Flagger posts made for this channel.
    Flagged(usize),
    /// Deactivated: the channel reached `state` but nothing was sent.
    DryRun(ChannelState),
}

impl Outcome {
    /// Lifecycle state this outcome leaves the channel in.
    pub fn state(&self) -> ChannelState {
        match self {
            Self::Ignored => ChannelState::Ignored,
            Self::NotStale | Self::Flagged(_) => ChannelState::Active,
            Self::Stale | Self::AwaitingWarning => ChannelState::WarningEligible,
            Self::AlreadyWarned | Self::Warned | Self::Blocked(_) => ChannelState::Warned,
            Self::Archived => ChannelState::Archived,
            Self::DryRun(state) => *state,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::NotStale => "not_stale",
            Self::Stale => "stale",
            Self::AlreadyWarned => "already_warned",
            Self::Warned => "warned",
            Self::AwaitingWarning => "awaiting_warning",
            Self::Blocked(_) => "blocked",
            Self::Archived => "archived",
            Self::Flagged(_) => "flagged",
            Self::DryRun(_) => "dry_run",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked(block) => write!(f, "blocked ({block})"),
            Self::Flagged(n) => write!(f, "flagged {n}"),
            Self::DryRun(state) => write!(f, "dry run ({})", state.label()),
            other => f.write_str(other.label()),
        }
    }
}

/// Outcomes and failures of one batch operation, in processing order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub operation: String,
    pub outcomes: Vec<(String, Outcome)>,
    pub failures: Vec<(String, TransportError)>,
}

impl RunReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, channel: &str, outcome: Outcome) {
        self.outcomes.push((channel.to_string(), outcome));
    }

    pub fn record_failure(&mut self, channel: &str, error: TransportError) {
        self.failures.push((channel.to_string(), error));
    }

    /// Outcome recorded for `channel`, if any.
    pub fn outcome(&self, channel: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, outcome)| outcome)
    }

    /// Channels whose outcome satisfies `pred`, in processing order.
    pub fn channels_where(&self, pred: impl Fn(&Outcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Human-readable summary for the report sink.
    ///
    /// First line tallies outcomes; then one line per channel that was acted
    /// on, blocked, listed as stale or failed.
    pub fn summary(&self) -> String {
        let mut tally: Vec<(&'static str, usize)> = Vec::new();
        for (_, outcome) in &self.outcomes {
            match tally.iter_mut().find(|(label, _)| *label == outcome.label()) {
                Some((_, n)) => *n += 1,
                None => tally.push((outcome.label(), 1)),
            }
        }

        let mut lines = Vec::new();
        let counts = tally
            .iter()
            .map(|(label, n)| format!("{label}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!(
            "{}: {} channel(s), {} failure(s){}{}",
            self.operation,
            self.outcomes.len(),
            self.failures.len(),
            if counts.is_empty() { "" } else { " | " },
            counts
        ));

        for (channel, outcome) in &self.outcomes {
            if matches!(
                outcome,
                Outcome::Ignored | Outcome::NotStale | Outcome::AlreadyWarned | Outcome::Flagged(0)
            ) {
                continue;
            }
            lines.push(format!("  #{channel}: {outcome}"));
        }
        for (channel, error) in &self.failures {
            lines.push(format!("  #{channel}: failed: {error}"));
        }
        lines.join("\n")
    }
}
