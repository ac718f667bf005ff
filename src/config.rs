//! Configuration module for the paper search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PL_` and use double underscores
//! to separate nested levels:
//! - `PL_SEARCH__SCORE_MIN=0.7` sets `search.score_min`
//! - `PL_ENCODER__DEFAULT_KIND=chunked-sentence` sets `encoder.default_kind`
//! - `PL_TOPICS__CLUSTER_COUNT=32` sets `topics.cluster_count`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .paperlens is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Number of parallel threads for scoring and clustering
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Embedding cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Search pipeline settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Topic clustering settings
    #[serde(default)]
    pub topics: TopicConfig,

    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Directory holding matrix artifacts and the timestamp file
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Papers per encoder batch during updates
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Weight of the title matrix when blending title and abstract rows
    #[serde(default = "default_title_importance")]
    pub title_importance: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EncoderConfig {
    /// Encoder used when none is named explicitly:
    /// "sentence", "chunked-sentence", or "topic-model"
    #[serde(default = "default_encoder_kind")]
    pub default_kind: String,

    /// Directory for downloaded and fitted model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Words per chunk for the chunked encoder
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlapping words between neighboring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Upper bound on chunks per document
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// File name of the fitted topic model artifact inside models_dir
    #[serde(default = "default_topic_model_file")]
    pub topic_model_file: String,

    /// Show a progress bar during first-time model download
    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Minimum stage score for a paper to contribute to the combined result
    #[serde(default = "default_score_min")]
    pub score_min: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TopicConfig {
    /// Cluster count for a full recompute
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,

    /// Cluster count for a coarse pass
    #[serde(default = "default_coarse_cluster_count")]
    pub coarse_cluster_count: usize,

    /// Keywords kept per topic
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    /// Keywords joined into the topic name
    #[serde(default = "default_name_keyword_count")]
    pub name_keyword_count: usize,

    /// Laplace smoothing for the keyword model
    #[serde(default = "default_nb_alpha")]
    pub nb_alpha: f64,

    /// Neighbors consulted when assigning new papers to existing topics
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RemoteConfig {
    /// Root directory of the remote store; unset disables push/pull
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".paperlens/cache")
}
fn default_batch_size() -> usize {
    256
}
fn default_title_importance() -> f32 {
    0.5
}
fn default_encoder_kind() -> String {
    "sentence".to_string()
}
fn default_models_dir() -> PathBuf {
    PathBuf::from(".paperlens/models")
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_chunk_size() -> usize {
    200
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_max_chunks() -> usize {
    4
}
fn default_topic_model_file() -> String {
    "topic_model.json".to_string()
}
fn default_score_min() -> f32 {
    0.65
}
fn default_cluster_count() -> usize {
    48
}
fn default_coarse_cluster_count() -> usize {
    20
}
fn default_keyword_count() -> usize {
    50
}
fn default_name_keyword_count() -> usize {
    7
}
fn default_nb_alpha() -> f64 {
    0.07
}
fn default_neighbor_count() -> usize {
    15
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            debug: false,
            parallel_threads: default_parallel_threads(),
            cache: CacheConfig::default(),
            encoder: EncoderConfig::default(),
            search: SearchConfig::default(),
            topics: TopicConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            batch_size: default_batch_size(),
            title_importance: default_title_importance(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            default_kind: default_encoder_kind(),
            models_dir: default_models_dir(),
            model: default_embedding_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_chunks: default_max_chunks(),
            topic_model_file: default_topic_model_file(),
            show_download_progress: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            score_min: default_score_min(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            cluster_count: default_cluster_count(),
            coarse_cluster_count: default_coarse_cluster_count(),
            keyword_count: default_keyword_count(),
            name_keyword_count: default_name_keyword_count(),
            nb_alpha: default_nb_alpha(),
            neighbor_count: default_neighbor_count(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .paperlens directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".paperlens/settings.toml"));

        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with PL_ prefix
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed("PL_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            // Extract into Settings struct
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Find the workspace root by looking for .paperlens directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".paperlens");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        // Try to find workspace config
        let config_path = if let Some(path) = Self::find_workspace_config() {
            path
        } else {
            // No workspace found, check current directory
            PathBuf::from(".paperlens/settings.toml")
        };

        // Check if settings.toml exists
        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        // Try to parse the config file to check if it's valid
        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'paperlens init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Get the workspace root directory (where .paperlens is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".paperlens");
            if config_dir.exists() && config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Resolve a configured path against the workspace root.
    ///
    /// Absolute paths pass through untouched; relative paths are anchored
    /// at the workspace root when one is known.
    #[must_use]
    pub fn resolve_path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.workspace_root {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Directory holding matrix artifacts and the timestamp file.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve_path(&self.cache.dir)
    }

    /// Directory for downloaded and fitted model artifacts.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.resolve_path(&self.encoder.models_dir)
    }

    /// Full path of the fitted topic model artifact.
    #[must_use]
    pub fn topic_model_path(&self) -> PathBuf {
        self.models_dir().join(&self.encoder.topic_model_file)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PL_").split("_"))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".paperlens/settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create a well-documented settings.toml template
        let current_dir = std::env::current_dir().unwrap_or_default();
        let template = format!(
            r#"# Paperlens Configuration File
# https://github.com/jhertel/paperlens

# Version of the configuration schema
version = 1

# Workspace root directory (automatically detected)
workspace_root = "{}"

# Global debug mode
debug = false

# Number of parallel threads for scoring and clustering (defaults to CPU count)
# parallel_threads = {}

[cache]
# Directory holding matrix artifacts and the timestamp file
dir = ".paperlens/cache"

# Papers per encoder batch during updates
batch_size = 256

# Weight of the title matrix when blending title and abstract rows (0.0 to 1.0)
title_importance = 0.5

[encoder]
# Encoder used when none is named explicitly:
# "sentence", "chunked-sentence", or "topic-model"
default_kind = "sentence"

# Directory for downloaded and fitted model artifacts
models_dir = ".paperlens/models"

# Embedding model name
model = "AllMiniLML6V2"

# Chunking for long abstracts (chunked-sentence encoder)
chunk_size = 200
chunk_overlap = 50
max_chunks = 4

# File name of the fitted topic model artifact inside models_dir
topic_model_file = "topic_model.json"

# Show a progress bar during first-time model download
show_download_progress = false

[search]
# Minimum stage score for a paper to contribute to results (0.0 to 1.0)
score_min = 0.65

[topics]
# Cluster count for a full recompute
cluster_count = 48

# Cluster count for a coarse pass
coarse_cluster_count = 20

# Keywords kept per topic; the first few become the topic name
keyword_count = 50
name_keyword_count = 7

# Laplace smoothing for the keyword model
nb_alpha = 0.07

# Neighbors consulted when assigning new papers to existing topics
neighbor_count = 15

[remote]
# Root directory of the remote store; leave unset to disable push/pull
# path = "/mnt/shared/paperlens"
"#,
            current_dir.display(),
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        // Create the cache and models directories alongside the config
        Self::create_workspace_dirs()?;

        Ok(config_path)
    }

    /// Create the cache and models directories for a fresh workspace
    fn create_workspace_dirs() -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(".paperlens/cache")?;
        std::fs::create_dir_all(".paperlens/models")?;
        Ok(())
    }
}
