//! Slack Web API transport.
//!
//! Reads go through GET with query parameters, writes through JSON POST.
//! The channel and user directories are fetched once per client and reused
//! for the rest of the run. Nothing is retried: a failed call surfaces to
//! the engine, which skips that channel for this run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{ConfigError, TransportError};
use crate::transport::{
    ChannelInfo, ChannelRef, ChatTransport, Message, MessageKind, channel_link_token,
    format_slack_ts,
};

const DEFAULT_API_BASE: &str = "https://slack.com/api";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const PAGE_LIMIT: u32 = 200;

/// Connection settings for the Slack Web API.
#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub token: SecretString,
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl SlackSettings {
    /// Build settings from environment variables.
    ///
    /// `SLACK_TOKEN` is required; `SLACK_API_BASE` and
    /// `SLACK_REQUEST_TIMEOUT_MS` fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("SLACK_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("SLACK_TOKEN".into()))?;

        let api_base =
            std::env::var("SLACK_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let request_timeout_ms: u64 = std::env::var("SLACK_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Self {
            token: SecretString::from(token),
            api_base,
            request_timeout_ms,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ResponseMetadata {
    fn cursor(meta: Option<ResponseMetadata>) -> Option<String> {
        meta.and_then(|m| m.next_cursor)
            .filter(|cursor| !cursor.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsList {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsInfo {
    #[serde(default)]
    channel: Option<SlackChannel>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsMembers {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsHistory {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_restricted: bool,
    #[serde(default)]
    is_ultra_restricted: bool,
    #[serde(default)]
    profile: SlackProfile,
}

impl SlackUser {
    fn display_name(&self) -> &str {
        if self.profile.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.profile.display_name
        }
    }

    fn restricted(&self) -> bool {
        self.is_restricted || self.is_ultra_restricted
    }
}

#[derive(Debug, Default, Deserialize)]
struct UsersList {
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Permalink {
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

// ── Client ──────────────────────────────────────────────────────────

/// Production [`ChatTransport`] backed by the Slack Web API.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
    channels: OnceCell<BTreeMap<String, SlackChannel>>,
    users: OnceCell<HashMap<String, SlackUser>>,
}

impl SlackClient {
    pub fn new(settings: &SlackSettings) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("channel-reaper/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(settings.request_timeout_ms.max(1)))
            .build()
            .map_err(|e| TransportError::Request {
                operation: "client setup".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            channels: OnceCell::new(),
            users: OnceCell::new(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let request = self
            .http
            .get(self.api_url(method))
            .bearer_auth(self.token.expose_secret())
            .query(query);
        self.send(method, request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let request = self
            .http
            .post(self.api_url(method))
            .bearer_auth(self.token.expose_secret())
            .json(payload);
        self.send(method, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        debug!(method, "Slack API call");
        let response = request.send().await.map_err(|e| TransportError::Request {
            operation: method.into(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                operation: method.into(),
                status: status.as_u16(),
                body: truncate_for_error(&body, 400),
            });
        }

        let envelope: Envelope<T> =
            response.json().await.map_err(|e| TransportError::Decode {
                operation: method.into(),
                reason: e.to_string(),
            })?;

        if !envelope.ok {
            return Err(TransportError::Api {
                operation: method.into(),
                error: envelope.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(envelope.body)
    }

    async fn channel_directory(&self) -> Result<&BTreeMap<String, SlackChannel>, TransportError> {
        self.channels
            .get_or_try_init(|| async {
                let mut directory = BTreeMap::new();
                let mut cursor: Option<String> = None;
                loop {
                    let mut query = vec![
                        ("exclude_archived", "true".to_string()),
                        ("types", "public_channel".to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                    ];
                    if let Some(ref c) = cursor {
                        query.push(("cursor", c.clone()));
                    }
                    let page: ConversationsList = self.get("conversations.list", &query).await?;
                    for channel in page.channels {
                        directory.insert(channel.name.clone(), channel);
                    }
                    cursor = ResponseMetadata::cursor(page.response_metadata);
                    if cursor.is_none() {
                        break;
                    }
                }
                debug!(count = directory.len(), "Loaded channel directory");
                Ok::<_, TransportError>(directory)
            })
            .await
    }

    async fn user_directory(&self) -> Result<&HashMap<String, SlackUser>, TransportError> {
        self.users
            .get_or_try_init(|| async {
                let mut directory = HashMap::new();
                let mut cursor: Option<String> = None;
                loop {
                    let mut query = vec![("limit", PAGE_LIMIT.to_string())];
                    if let Some(ref c) = cursor {
                        query.push(("cursor", c.clone()));
                    }
                    let page: UsersList = self.get("users.list", &query).await?;
                    for user in page.members {
                        directory.insert(user.id.clone(), user);
                    }
                    cursor = ResponseMetadata::cursor(page.response_metadata);
                    if cursor.is_none() {
                        break;
                    }
                }
                debug!(count = directory.len(), "Loaded user directory");
                Ok::<_, TransportError>(directory)
            })
            .await
    }

    async fn channel_id(&self, channel: &str) -> Result<String, TransportError> {
        self.channel_directory()
            .await?
            .get(channel)
            .map(|c| c.id.clone())
            .ok_or_else(|| TransportError::UnknownChannel {
                name: channel.to_string(),
            })
    }

    async fn member_ids(&self, channel_id: &str) -> Result<Vec<String>, TransportError> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("channel", channel_id.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }
            let page: ConversationsMembers = self.get("conversations.members", &query).await?;
            members.extend(page.members);
            cursor = ResponseMetadata::cursor(page.response_metadata);
            if cursor.is_none() {
                break;
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn list_channels(&self) -> Result<Vec<ChannelRef>, TransportError> {
        Ok(self
            .channel_directory()
            .await?
            .values()
            .map(|c| ChannelRef {
                name: c.name.clone(),
                id: c.id.clone(),
            })
            .collect())
    }

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, TransportError> {
        let id = self.channel_id(channel).await?;
        let info: ConversationsInfo = self
            .get("conversations.info", &[("channel", id.clone())])
            .await?;
        let created = info
            .channel
            .map(|c| c.created)
            .ok_or_else(|| TransportError::Decode {
                operation: "conversations.info".into(),
                reason: "response missing channel".into(),
            })?;

        let member_ids: BTreeSet<String> = self.member_ids(&id).await?.into_iter().collect();
        let users = self.user_directory().await?;
        let restricted_member_ids = member_ids
            .iter()
            .filter(|m| users.get(*m).is_some_and(SlackUser::restricted))
            .cloned()
            .collect();

        Ok(ChannelInfo {
            id,
            name: channel.to_string(),
            age_secs: Utc::now().timestamp() - created,
            member_ids,
            restricted_member_ids,
        })
    }

    async fn channel_member_names(&self, channel: &str) -> Result<Vec<String>, TransportError> {
        let id = self.channel_id(channel).await?;
        let members = self.member_ids(&id).await?;
        let users = self.user_directory().await?;
        Ok(members
            .iter()
            .map(|m| {
                users
                    .get(m)
                    .map(|u| u.display_name().to_string())
                    .unwrap_or_else(|| m.clone())
            })
            .collect())
    }

    async fn messages_in_range(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Result<Vec<Message>, TransportError> {
        let id = self.channel_id(channel).await?;
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("channel", id.clone()),
                ("oldest", format_slack_ts(oldest)),
                ("latest", format_slack_ts(latest)),
                ("inclusive", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }
            let page: ConversationsHistory = self.get("conversations.history", &query).await?;
            messages.extend(page.messages);
            cursor = ResponseMetadata::cursor(page.response_metadata);
            if !page.has_more || cursor.is_none() {
                break;
            }
        }
        debug!(channel, count = messages.len(), "Fetched channel history");
        Ok(messages)
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<(), TransportError> {
        let id = self.channel_id(channel).await?;
        let mut payload = json!({
            "channel": id,
            "text": text,
            "link_names": true,
        });
        if let Some(marker) = kind.marker() {
            payload["attachments"] = json!([{ "fallback": marker }]);
        }
        let _: Empty = self.post("chat.postMessage", &payload).await?;
        Ok(())
    }

    async fn archive(&self, channel: &str) -> Result<(), TransportError> {
        let id = self.channel_id(channel).await?;
        let _: Empty = self
            .post("conversations.archive", &json!({ "channel": id }))
            .await?;
        Ok(())
    }

    async fn channel_markup(&self, channel: &str) -> Result<Option<String>, TransportError> {
        Ok(self
            .channel_directory()
            .await?
            .get(channel)
            .map(|c| channel_link_token(&c.id, &c.name)))
    }

    async fn permalink(&self, channel: &str, ts: &str) -> Result<String, TransportError> {
        let id = self.channel_id(channel).await?;
        let link: Permalink = self
            .get(
                "chat.getPermalink",
                &[("channel", id), ("message_ts", ts.to_string())],
            )
            .await?;
        link.permalink.ok_or_else(|| TransportError::Decode {
            operation: "chat.getPermalink".into(),
            reason: "response missing permalink".into(),
        })
    }
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
