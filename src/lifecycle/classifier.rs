//! Message classification.
//!
//! Decides which messages count as channel activity and which ones are our
//! own earlier staleness warnings.

use std::sync::LazyLock;

use regex::Regex;

use crate::policy::Policy;
use crate::transport::{Message, WARNING_MARKER};

/// Text made only of emoji shortcodes, e.g. `:dolphin:` or `:+1::skin-tone-2:`.
static EMOJI_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?::[a-z0-9_+'\-]+:\s*)+$").expect("emoji shortcode pattern compiles")
});

/// True if `message` counts toward keeping its channel alive.
///
/// Excluded: ignored authors, subtypes outside `included_subtypes` (unknown
/// subtypes included), and bare emoji posts with nothing attached. A message
/// carrying only reactions still counts.
pub fn is_activity(message: &Message, policy: &Policy) -> bool {
    if let Some(user) = message.user.as_deref() {
        if policy.ignore_users.contains(user) {
            return false;
        }
    }

    if let Some(subtype) = message.subtype.as_deref() {
        if !policy.included_subtypes.contains(subtype) {
            return false;
        }
    }

    !is_emoji_only(message)
}

/// True for a message whose text is nothing but emoji shortcodes and which
/// has no attachments or reactions.
pub fn is_emoji_only(message: &Message) -> bool {
    let text = message.text.trim();
    !text.is_empty()
        && message.attachments.is_empty()
        && message.reactions.is_empty()
        && EMOJI_ONLY.is_match(text)
}

/// True if `message` is a staleness warning posted from `warning_text`.
///
/// Needs both the text prefix and the warning marker attachment. Prefix, not
/// equality, so warnings with appended text still count.
pub fn is_prior_warning(message: &Message, warning_text: &str) -> bool {
    message.text.starts_with(warning_text) && carries_marker(message, WARNING_MARKER)
}

/// True if some attachment's fallback text is exactly `marker`.
pub fn carries_marker(message: &Message, marker: &str) -> bool {
    message
        .attachments
        .iter()
        .any(|a| a.fallback.as_deref() == Some(marker))
}

/// True if any message in the window is a prior warning.
pub fn has_prior_warning(messages: &[Message], warning_text: &str) -> bool {
    messages.iter().any(|m| is_prior_warning(m, warning_text))
}
