use crate::config::types::{Config, CrawlerConfig, DelayRange, FeedConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_feed_config(&config.feed)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.threads < 1 {
        return Err(ConfigError::Validation(format!(
            "threads must be >= 1, got {}",
            config.threads
        )));
    }

    if config.processes < 1 {
        return Err(ConfigError::Validation(format!(
            "processes must be >= 1, got {}",
            config.processes
        )));
    }

    validate_delay_range("delay-before", config.delay_before)?;
    validate_delay_range("delay-error", config.delay_error)?;
    validate_delay_range("page-retry-delay", config.page_retry_delay)?;

    Ok(())
}

fn validate_delay_range(name: &str, range: DelayRange) -> Result<(), ConfigError> {
    if range.min() > range.max() {
        return Err(ConfigError::Validation(format!(
            "{} must be a [min, max] pair with min <= max, got [{}, {}]",
            name,
            range.min(),
            range.max()
        )));
    }
    Ok(())
}

/// Validates feed configuration
fn validate_feed_config(config: &FeedConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.base_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "base-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
