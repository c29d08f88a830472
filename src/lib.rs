//! Makeup-Harvest: a resumable feed crawler with a batch extraction stage
//!
//! This crate crawls a social feed by hashtag or account, downloads the
//! image media it finds, and then runs a feature-extraction pass that
//! splits every downloaded face into per-category crops (eyes, eyelids,
//! lips, ...) plus a colour palette.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod feed;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Makeup-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Feed error: {0}")]
    Feed(#[from] feed::FeedError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task for target '{target}' failed: {message}")]
    Task { target: String, message: String },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for environment variable {name}: '{value}'")]
    Env { name: String, value: String },
}

/// Result type alias for Makeup-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, DedupPolicy};
pub use crawler::{run_crawl, Coordinator, RunSummary};
pub use extract::{Category, DerivedImages, FeatureExtractor};
pub use feed::{FeedSource, Target, TargetKind};
pub use state::{ProgressReporter, Stage, StageController};
