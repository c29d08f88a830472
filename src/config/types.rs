use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Makeup-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub feed: FeedConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of images to download before switching to extraction (0 = unlimited)
    #[serde(rename = "image-limit")]
    pub image_limit: u64,

    /// Uniqueness rule for retained filenames
    pub dedup: DedupPolicy,

    /// Concurrent downloads per target
    pub threads: usize,

    /// Size of the extraction worker pool
    pub processes: usize,

    /// Randomized sleep before every image request (milliseconds)
    #[serde(rename = "delay-before")]
    pub delay_before: DelayRange,

    /// Randomized sleep after a failed image request (milliseconds)
    #[serde(rename = "delay-error")]
    pub delay_error: DelayRange,

    /// Randomized sleep after a failed feed page request (milliseconds)
    #[serde(rename = "page-retry-delay")]
    pub page_retry_delay: DelayRange,

    /// Attempts per request before giving up (0 = retry forever)
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl CrawlerConfig {
    /// The image limit, or None when unlimited
    pub fn limit(&self) -> Option<u64> {
        (self.image_limit > 0).then_some(self.image_limit)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn may_retry(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            image_limit: 0,
            dedup: DedupPolicy::PerTarget,
            threads: workers,
            processes: workers,
            delay_before: DelayRange(0, 0),
            delay_error: DelayRange(1_000, 5_000),
            page_retry_delay: DelayRange(15_000, 60_000),
            max_attempts: 0,
        }
    }
}

/// Available cores minus one, never below one
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// An inclusive `[min, max]` range of milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange(pub u64, pub u64);

impl DelayRange {
    pub fn min(&self) -> u64 {
        self.0
    }

    pub fn max(&self) -> u64 {
        self.1
    }
}

/// Uniqueness rule applied to candidate filenames
///
/// Configured by numeric code: 0 is per-target, 1 is global, any other
/// value disables deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum DedupPolicy {
    /// Reject filenames already retained for the same target
    PerTarget,
    /// Reject filenames already retained for any target
    Global,
    /// Never reject
    None,
}

impl From<i64> for DedupPolicy {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::PerTarget,
            1 => Self::Global,
            _ => Self::None,
        }
    }
}

/// Feed client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// API root the feed endpoints hang off
    #[serde(rename = "base-url")]
    pub base_url: String,

    pub login: Option<String>,

    pub password: Option<String>,

    /// User agent sent with feed and image requests
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://i.instagram.com/api/v1".to_string(),
            login: None,
            password: None,
            user_agent: format!("makeup-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory holding one subtree per target
    #[serde(rename = "base-path")]
    pub base_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
        }
    }
}
