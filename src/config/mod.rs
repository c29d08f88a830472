//! Configuration module for Makeup-Harvest
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables (`IMAGES_NUMBER`, `DELAY_BEFORE`, `UNIQ_TYPE`, ...).
//!
//! # Example
//!
//! ```no_run
//! use makeup_harvest::config::load_config_with_env;
//!
//! let config = load_config_with_env(None).unwrap();
//! println!("Downloading with {} threads", config.crawler.threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_workers, Config, CrawlerConfig, DedupPolicy, DelayRange, FeedConfig, OutputConfig,
};

// Re-export parser functions
pub use parser::{apply_env_overrides, load_config, load_config_with_env, parse_delay_range};
pub use validation::validate;
