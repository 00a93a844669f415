//! Extension configuration.
//!
//! Hosts either construct [`ExtensionConfig`] directly or deserialize it from
//! TOML. Validation collects every problem found rather than stopping at the
//! first.

use crate::entity::Snowflake;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returns `true` (for serde defaults).
fn default_true() -> bool {
    true
}

fn default_prefixes() -> Vec<String> {
    vec!["!".to_string()]
}

/// Platform hard limit for plain message content, in characters.
fn default_message_length_limit() -> usize {
    2000
}

fn default_name_length_limit() -> usize {
    32
}

/// Configuration for an [`Extension`](crate::extension::Extension).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Prefixes that introduce a text command (e.g. `!`).
    pub prefixes: Vec<String>,
    /// Match text command names ignoring ASCII case.
    pub case_insensitive: bool,
    /// Respond to reported errors with a formatted chat message.
    pub enable_default_error_handler: bool,
    /// Maximum characters in one chat message; longer error reports fall back
    /// to a file attachment.
    pub message_length_limit: usize,
    /// Maximum length of a command name.
    pub name_length_limit: usize,
    /// Accounts the require-owner check accepts.
    pub owner_ids: Vec<Snowflake>,
    /// Ignore messages authored by bots in the text processor.
    pub ignore_bots: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
            case_insensitive: false,
            enable_default_error_handler: default_true(),
            message_length_limit: default_message_length_limit(),
            name_length_limit: default_name_length_limit(),
            owner_ids: Vec::new(),
            ignore_bots: default_true(),
        }
    }
}

/// Validation errors for extension configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("prefixes must not be empty")]
    NoPrefixes,
    #[error("prefix '{0}' contains whitespace")]
    PrefixWithWhitespace(String),
    #[error("message_length_limit must be at least 64, got {0}")]
    MessageLimitTooSmall(usize),
    #[error("name_length_limit must be between 1 and 100, got {0}")]
    NameLimitOutOfRange(usize),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ExtensionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(input: &str) -> Result<Self, Vec<ConfigError>> {
        let config: Self = toml::from_str(input).map_err(|e| vec![ConfigError::Parse(e)])?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning all errors found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.prefixes.is_empty() {
            errors.push(ConfigError::NoPrefixes);
        }
        for prefix in &self.prefixes {
            if prefix.chars().any(char::is_whitespace) {
                errors.push(ConfigError::PrefixWithWhitespace(prefix.clone()));
            }
        }
        if self.message_length_limit < 64 {
            errors.push(ConfigError::MessageLimitTooSmall(self.message_length_limit));
        }
        if self.name_length_limit == 0 || self.name_length_limit > 100 {
            errors.push(ConfigError::NameLimitOutOfRange(self.name_length_limit));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ExtensionConfig::default().validate().expect("default config must validate");
    }

    #[test]
    fn collects_all_errors() {
        let config = ExtensionConfig {
            prefixes: vec![],
            message_length_limit: 10,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn parses_toml() {
        let config = ExtensionConfig::from_toml(
            r#"
            prefixes = ["!", "?"]
            case_insensitive = true
            owner_ids = [1234]
            "#,
        )
        .expect("config should parse");
        assert_eq!(config.prefixes, vec!["!", "?"]);
        assert!(config.case_insensitive);
        assert_eq!(config.owner_ids, vec![Snowflake(1234)]);
        // Unspecified fields fall back to defaults
        assert_eq!(config.message_length_limit, 2000);
    }
}
