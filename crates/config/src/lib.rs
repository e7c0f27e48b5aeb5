//! Tally configuration structures to map the tally.toml configuration.

#![deny(missing_docs)]

mod health;
mod llm;
mod loader;
mod server;
mod storage;
mod telemetry;

use std::path::Path;

pub use health::HealthConfig;
pub use llm::{ConversationConfig, LlmConfig, ModelConfig, ProviderConfig, RetryConfig};
pub use server::ServerConfig;
pub use storage::{RedisConfig, RedisPoolConfig, StorageConfig};
pub use telemetry::{ExportersConfig, OtlpExporterConfig, OtlpProtocol, TelemetryConfig};

use serde::Deserialize;

/// Main configuration structure for the Tally gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM gateway configuration settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Where the active credential index is persisted.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Telemetry configuration. Metrics are only exported when this section is present.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration can drive the streaming gateway.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
