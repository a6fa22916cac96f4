//! Layered configuration: built-in defaults, then an optional TOML file,
//! then `IDEAFORGE_*` environment variables (a `.env` file is honored).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "IDEAFORGE_CONFIG";

const ENV_PREFIX: &str = "IDEAFORGE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    pub generator: GeneratorConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub database: DatabaseConfig,
    pub blobs: BlobConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Deterministic generator, no network access.
    #[default]
    Mock,
    /// OpenAI-compatible chat/images API.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub kind: GeneratorKind,
    pub base_url: String,
    pub model: String,
    pub image_model: String,
    /// Name of the env var holding the API key. The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Mock,
            base_url: "https://api.openai.com/v1/".into(),
            model: "gpt-4o-mini".into(),
            image_model: "gpt-image-1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            request_timeout_secs: 120,
            temperature: 0.9,
        }
    }
}

impl GeneratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the API key from the configured env var.
    pub fn api_key(&self) -> Result<String, AppError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config(format!("{} is not set", self.api_key_env))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub ideas_per_batch: usize,
    pub max_idea_batches: i64,
    pub top_idea_count: usize,
    /// Left swipes needed (with no positive swipe) before the session is
    /// flagged as "all disliked".
    pub all_disliked_threshold: usize,
    pub max_visuals_per_request: usize,
    pub mutations_per_type: usize,
    pub max_liked_for_mutation: usize,
    pub max_disliked_for_mutation: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ideas_per_batch: 10,
            max_idea_batches: 3,
            top_idea_count: 5,
            all_disliked_threshold: 5,
            max_visuals_per_request: 4,
            mutations_per_type: 3,
            max_liked_for_mutation: 5,
            max_disliked_for_mutation: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (attempts = max_retries + 1).
    pub max_retries: u32,
    pub base_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub response_sliding_secs: i64,
    pub response_absolute_secs: i64,
    pub gallery_sliding_secs: i64,
    pub gallery_absolute_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            response_sliding_secs: 30 * 60,
            response_absolute_secs: 2 * 60 * 60,
            gallery_sliding_secs: 5 * 60,
            gallery_absolute_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub ttl_hours: i64,
    pub replay_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            replay_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("ideaforge.db").display().to_string(),
            pool_size: 8,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobConfig {
    pub root: PathBuf,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_data_dir().join("blobs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    pub filter: String,
    pub json: bool,
    /// When set, a daily-rolling log file is written here as well.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,ideaforge=debug".into(),
            json: false,
            directory: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ideaforge")
}

impl ForgeConfig {
    /// Load configuration from `path` (or `$IDEAFORGE_CONFIG`), then apply
    /// environment overrides. A missing file is not an error when no path
    /// was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Apply `IDEAFORGE_*` overrides. `lookup` is injected for tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("GENERATOR") {
            self.generator.kind = match v.to_lowercase().as_str() {
                "mock" => GeneratorKind::Mock,
                "live" => GeneratorKind::Live,
                other => {
                    return Err(AppError::Config(format!(
                        "unknown generator kind '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = get("BASE_URL") {
            self.generator.base_url = v;
        }
        if let Some(v) = get("MODEL") {
            self.generator.model = v;
        }
        if let Some(v) = get("IMAGE_MODEL") {
            self.generator.image_model = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("BLOB_ROOT") {
            self.blobs.root = PathBuf::from(v);
        }
        if let Some(v) = get("LOG") {
            self.logging.filter = v;
        }
        if let Some(v) = get("LOG_JSON") {
            self.logging.json = parse_env("LOG_JSON", &v)?;
        }
        if let Some(v) = get("MAX_IDEA_BATCHES") {
            self.pipeline.max_idea_batches = parse_env("MAX_IDEA_BATCHES", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.retry.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!("{ENV_PREFIX}{name} has invalid value '{value}'"))
    })
}
