//! Channel-reference markup.
//!
//! Rewrites bare `#channel-name` references into the transport's link
//! tokens before a message is posted.

use std::collections::HashMap;

use regex::{Captures, Regex};

use crate::error::TransportError;
use crate::transport::{ChatTransport, MessageKind};

/// A `#` followed by a lowercase channel name. Uppercase-led tokens such as
/// `#HASHTAG` never match.
const CHANNEL_REFERENCE: &str = r"#([a-z0-9][a-z0-9-]*)\b";

/// Precompiled channel-reference scanner.
#[derive(Debug, Clone)]
pub struct MarkupResolver {
    pattern: Regex,
}

impl MarkupResolver {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(CHANNEL_REFERENCE).expect("channel reference pattern compiles"),
        }
    }

    /// Distinct channel names referenced in `text`, in order of first use.
    pub fn references<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut seen = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            if let Some(name) = caps.get(1).map(|m| m.as_str()) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Replace each reference that has a token in `tokens`; leave the rest
    /// of `text` untouched.
    pub fn substitute(&self, text: &str, tokens: &HashMap<String, String>) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                tokens
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Resolve every reference in `text` through `transport`. Each distinct
    /// name is looked up once; unknown names stay as written.
    pub async fn resolve(
        &self,
        text: &str,
        transport: &dyn ChatTransport,
    ) -> Result<String, TransportError> {
        let mut tokens = HashMap::new();
        for name in self.references(text) {
            if let Some(token) = transport.channel_markup(name).await? {
                tokens.insert(name.to_string(), token);
            }
        }
        if tokens.is_empty() {
            return Ok(text.to_string());
        }
        Ok(self.substitute(text, &tokens))
    }
}

impl Default for MarkupResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve markup in `text`, then post it to `channel`.
pub async fn post_marked_up_message(
    transport: &dyn ChatTransport,
    resolver: &MarkupResolver,
    channel: &str,
    text: &str,
    kind: MessageKind,
) -> Result<(), TransportError> {
    let text = resolver.resolve(text, transport).await?;
    transport.post_message(channel, &text, kind).await
}
