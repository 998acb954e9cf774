//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::AppPaths;
use fixfinder_core::ResourceType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub ranking: RankingConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> ConfigResult<Self> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&paths.config_file)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &PathBuf) -> ConfigResult<()> {
        let default_config = Self::default_config_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, default_config)?;
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        self.ranking.validate()?;
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "search.similarity_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# Fixfinder Configuration
# Retrieval engine for equipment service documentation

[general]
# Data directory for the database
# data_dir = "~/.local/share/fixfinder"

[embedding]
# Embedding model used for semantic search. Vectors with a different
# dimensionality than configured here are rejected, not truncated.
model = "nomic-embed-text"
model_version = "v1.5"
dimensions = 768

# External embedder command. It receives chunk or query text on stdin and
# must print a JSON array of `dimensions` floats on stdout. Leave unset to
# run without the semantic index.
# command = "fixfinder-embed"

[search]
# Default result cap for ranked searches
default_limit = 20

# Semantic hits below this cosine similarity are excluded entirely
similarity_threshold = 0.35

[queue]
# Retry budget for ingestion tasks before they are dead-lettered
max_retries = 3

# Base backoff in seconds (doubles per retry)
retry_backoff_secs = 30

# Tasks stuck in processing longer than this are treated as failed
task_timeout_secs = 300

# Worker poll interval
poll_interval_secs = 2

[ranking]
# Authority ordering over resource types (lower = more authoritative).
# A bulletin always outranks a manual regardless of textual relevance;
# tune per deployment if the freshest-fix-wins rule needs adjusting.
bulletin = 1
manual = 2
video = 3
link = 4
part = 5
"#
        .to_string()
    }
}

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Override the platform data directory.
    pub data_dir: Option<PathBuf>,
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_model_version")]
    pub model_version: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// External embedder command. Receives text on stdin and must print a
    /// JSON array of floats. Unset disables the semantic index; lexical and
    /// catalog search still work.
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            model_version: default_model_version(),
            dimensions: default_dimensions(),
            command: None,
        }
    }
}

impl EmbeddingConfig {
    /// The configured model as a core domain value.
    pub fn model(&self) -> fixfinder_core::EmbeddingModel {
        fixfinder_core::EmbeddingModel::new(&self.model, &self.model_version, self.dimensions)
    }

    /// Whether an embedding backend is configured.
    pub fn enabled(&self) -> bool {
        self.command.is_some()
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_model_version() -> String {
    "v1.5".to_string()
}

fn default_dimensions() -> usize {
    768
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_limit() -> usize {
    20
}

fn default_similarity_threshold() -> f32 {
    0.35
}

/// Task queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: i64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_task_timeout_secs() -> i64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    2
}

/// Authority ordering over resource types.
///
/// Lower value = more authoritative. The ordering is a property of the type,
/// never computed per instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_bulletin_level")]
    pub bulletin: u8,
    #[serde(default = "default_manual_level")]
    pub manual: u8,
    #[serde(default = "default_video_level")]
    pub video: u8,
    #[serde(default = "default_link_level")]
    pub link: u8,
    #[serde(default = "default_part_level")]
    pub part: u8,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            bulletin: default_bulletin_level(),
            manual: default_manual_level(),
            video: default_video_level(),
            link: default_link_level(),
            part: default_part_level(),
        }
    }
}

impl RankingConfig {
    /// Priority level for a resource type under this policy.
    pub fn priority_level(&self, resource_type: ResourceType) -> u8 {
        match resource_type {
            ResourceType::Bulletin => self.bulletin,
            ResourceType::Manual => self.manual,
            ResourceType::Video => self.video,
            ResourceType::Link => self.link,
            ResourceType::Part => self.part,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for rt in ResourceType::all() {
            if self.priority_level(rt) == 0 {
                return Err(ConfigError::Invalid(format!(
                    "ranking.{} must be at least 1",
                    rt
                )));
            }
        }
        Ok(())
    }
}

fn default_bulletin_level() -> u8 {
    1
}

fn default_manual_level() -> u8 {
    2
}

fn default_video_level() -> u8 {
    3
}

fn default_link_level() -> u8 {
    4
}

fn default_part_level() -> u8 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&Config::default_config_string()).unwrap();
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.ranking.priority_level(ResourceType::Bulletin), 1);
        assert_eq!(config.ranking.priority_level(ResourceType::Part), 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.queue.max_retries, 3);
    }

    #[test]
    fn test_invalid_ranking_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ranking]\nbulletin = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.ranking.video = 2;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.ranking.video, 2);
    }
}
