use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::types::{api_key::ApiKeyRecord, profile::Profile};

/// Which embedding backend the binary should wire up. The engine itself only
/// sees the `Embedder` trait; this just selects the adapter.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    Openai,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Hashed
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_hashed_dimension")]
    pub hashed_dimension: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_generation_max_tokens")]
    pub generation_max_tokens: u32,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_quota_retry_attempts")]
    pub quota_retry_attempts: usize,
    #[serde(default = "default_quota_retry_backoff_ms")]
    pub quota_retry_backoff_ms: u64,
    /// Upstream credentials available to the quota pool.
    #[serde(default)]
    pub credentials: Vec<ApiKeyRecord>,
    /// Seed profiles installed at startup; a "default" profile is added if
    /// the list does not provide one.
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_hashed_dimension() -> usize {
    384
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_generation_max_tokens() -> u32 {
    1024
}

fn default_max_query_chars() -> usize {
    2000
}

fn default_quota_retry_attempts() -> usize {
    2
}

fn default_quota_retry_backoff_ms() -> u64 {
    250
}

fn default_profile_name() -> String {
    "default".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
