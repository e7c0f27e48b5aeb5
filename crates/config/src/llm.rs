//! LLM gateway configuration: the generative provider, its credentials, and
//! the retry policy of the streaming dispatcher.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use duration_str::deserialize_duration;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Configuration for an individual model exposed by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Optional rename - the actual provider model name.
    /// If not specified, the model ID (map key) is used.
    #[serde(default)]
    pub rename: Option<String>,
}

/// LLM configuration for the chat and extraction streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the LLM endpoints are exposed.
    enabled: bool,

    /// The path where the LLM endpoints will be mounted.
    pub path: Cow<'static, str>,

    /// Model used when a request does not choose one.
    pub default_model: Option<String>,

    /// Largest decoded document accepted by the extraction endpoint.
    pub max_document_bytes: usize,

    /// The generative provider and its credential pool.
    pub provider: ProviderConfig,

    /// Retry and backoff policy.
    pub retry: RetryConfig,

    /// In-process conversation history settings.
    pub conversations: ConversationConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/llm"),
            default_model: None,
            max_document_bytes: 20 * 1024 * 1024,
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            conversations: ConversationConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Whether the LLM functionality is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether at least one credential is configured.
    pub fn has_credentials(&self) -> bool {
        !self.provider.api_keys.is_empty()
    }
}

/// Connection settings for the Gemini-compatible provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Custom base URL for the provider API.
    pub base_url: Option<String>,

    /// Interchangeable API keys, tried in order when one is rate limited.
    pub api_keys: Vec<SecretString>,

    /// Upper bound for one streaming call, including the whole body.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// Ask the provider to stream its reasoning alongside the answer.
    pub include_thoughts: bool,

    /// Explicitly configured models.
    pub models: BTreeMap<String, ModelConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_keys: Vec::new(),
            timeout: Duration::from_secs(120),
            include_thoughts: true,
            models: BTreeMap::new(),
        }
    }
}

/// Retry policy for rate-limited and overloaded provider responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per credential before rotating (rate limits) or giving up (overload).
    pub max_attempts: u32,

    /// Base delays indexed by attempt number. The last entry is reused when
    /// there are more retries than entries.
    #[serde(deserialize_with = "deserialize_durations")]
    pub delays: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: vec![Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(10)],
        }
    }
}

/// Conversation history kept for the chat endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversationConfig {
    /// Most recent messages sent to the provider as history.
    pub max_history: usize,

    /// Maximum number of conversations held in memory.
    pub max_conversations: u64,

    /// Conversations untouched for this long are evicted.
    #[serde(deserialize_with = "deserialize_duration")]
    pub idle_timeout: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 40,
            max_conversations: 10_000,
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

fn deserialize_durations<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;

    raw.iter()
        .map(|value| duration_str::parse(value).map_err(serde::de::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indoc::indoc;

    use super::LlmConfig;

    #[test]
    fn delays_accept_mixed_units() {
        let config = indoc! {r#"
            [retry]
            delays = ["250ms", "1s", "1m"]
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert_eq!(
            config.retry.delays,
            vec![
                Duration::from_millis(250),
                Duration::from_secs(1),
                Duration::from_secs(60)
            ]
        );
    }

    #[test]
    fn invalid_delay_is_rejected() {
        let config = indoc! {r#"
            [retry]
            delays = ["soon"]
        "#};

        assert!(toml::from_str::<LlmConfig>(config).is_err());
    }

    #[test]
    fn credentials_are_detected() {
        let config = indoc! {r#"
            [provider]
            api_keys = ["a"]
        "#};

        let config: LlmConfig = toml::from_str(config).unwrap();

        assert!(config.has_credentials());
        assert!(!LlmConfig::default().has_credentials());
    }
}
