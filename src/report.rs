//! Report sinks for run summaries.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::TransportError;
use crate::policy::Policy;
use crate::transport::{ChatTransport, MessageKind};

/// Destination for human-readable status text.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn say(&self, text: &str) -> Result<(), TransportError>;
}

/// Posts summaries into a workspace channel.
pub struct ChannelReportSink {
    transport: Arc<dyn ChatTransport>,
    channel: String,
}

impl ChannelReportSink {
    pub fn new(transport: Arc<dyn ChatTransport>, channel: impl Into<String>) -> Self {
        Self {
            transport,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ReportSink for ChannelReportSink {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        self.transport
            .post_message(&self.channel, text, MessageKind::Ordinary)
            .await
    }
}

/// Writes summaries to the log.
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        for line in text.lines() {
            info!("{line}");
        }
        Ok(())
    }
}

/// Channel sink when the run is live and a report channel is configured;
/// the log otherwise, so dry runs never post.
pub fn report_sink_for(policy: &Policy, transport: Arc<dyn ChatTransport>) -> Arc<dyn ReportSink> {
    match policy.report_channel.as_deref() {
        Some(channel) if policy.activated => Arc::new(ChannelReportSink::new(transport, channel)),
        _ => Arc::new(LogReportSink),
    }
}
