//! Reaction-count rules for the flagger.

use regex::Regex;

use crate::config::FlagRuleConfig;
use crate::error::ConfigError;
use crate::transport::Message;

/// A flag rule with its reaction-name regex compiled.
#[derive(Debug, Clone)]
pub struct FlagRule {
    pub label: String,
    /// Pattern as written in the config.
    pub emoji_pattern: String,
    pub emoji: Regex,
    pub threshold: u32,
    pub output_channel: String,
}

impl FlagRule {
    pub fn compile(config: &FlagRuleConfig) -> Result<Self, ConfigError> {
        let emoji = Regex::new(&config.emoji).map_err(|e| ConfigError::InvalidValue {
            key: format!("flag_rules.{}.emoji", config.label),
            message: format!("{:?}: {e}", config.emoji),
        })?;
        Ok(Self {
            label: config.label.clone(),
            emoji_pattern: config.emoji.clone(),
            emoji,
            threshold: config.threshold,
            output_channel: config.output_channel.trim_start_matches('#').to_string(),
        })
    }

    /// Summed count of reactions whose names match.
    pub fn score(&self, message: &Message) -> u32 {
        message
            .reactions
            .iter()
            .filter(|r| self.emoji.is_match(&r.name))
            .map(|r| r.count)
            .sum()
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.score(message) >= self.threshold
    }
}

/// Compile every configured rule, failing on the first bad pattern.
pub fn compile_rules(configs: &[FlagRuleConfig]) -> Result<Vec<FlagRule>, ConfigError> {
    configs.iter().map(FlagRule::compile).collect()
}
