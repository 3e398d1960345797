//! Chat transport abstraction.
//!
//! The lifecycle engine only talks to the workspace through [`ChatTransport`].
//! `SlackClient` is the production implementation; `crate::testing` carries
//! a programmable double.

pub mod slack;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransportError;

pub use slack::{SlackClient, SlackSettings};
pub use types::*;

/// Trait for chat transports. Pure I/O, no policy.
///
/// Every method addresses channels by their current name; implementations
/// resolve names to ids internally.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// All live (non-archived) channels.
    async fn list_channels(&self) -> Result<Vec<ChannelRef>, TransportError>;

    /// Age and membership of a channel.
    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError>;

    /// Display names of the current members.
    async fn channel_member_names(&self, channel: &str) -> Result<Vec<String>, TransportError>;

    /// Raw history in `[oldest, latest]`, newest first.
    async fn messages_in_range(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Result<Vec<Message>, TransportError>;

    /// Post `text` into `channel`, tagged with `kind`.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<(), TransportError>;

    /// Archive `channel`.
    async fn archive(&self, channel: &str) -> Result<(), TransportError>;

    /// Link token for `channel`, or `None` if no such channel exists.
    async fn channel_markup(&self, channel: &str) -> Result<Option<String>, TransportError>;

    /// Permanent link to the message `ts` in `channel`.
    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, TransportError>;
}

/// Link token in Slack's channel mention format.
pub fn channel_link_token(id: &str, name: &str) -> String {
    format!("<#{id}|{name}>")
}
