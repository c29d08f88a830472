use crate::config::types::{Config, DedupPolicy, DelayRange};
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use makeup_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Threads: {}", config.crawler.threads);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = read_config_file(path)?;
    validate(&config)?;
    Ok(config)
}

/// Loads the optional config file, then applies process environment overrides
///
/// A `.env` file in the working directory is loaded into the environment
/// first, without overriding variables that are already set.
pub fn load_config_with_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Applies the environment-style overrides using `lookup` to read variables
///
/// Empty values are treated as absent.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(login) = get("FEED_LOGIN") {
        config.feed.login = Some(login);
    }
    if let Some(password) = get("FEED_PASSWORD") {
        config.feed.password = Some(password);
    }
    if let Some(value) = get("IMAGES_NUMBER") {
        config.crawler.image_limit = parse_number("IMAGES_NUMBER", &value)?;
    }
    if let Some(value) = get("DELAY_BEFORE") {
        config.crawler.delay_before = parse_delay_range("DELAY_BEFORE", &value)?;
    }
    if let Some(value) = get("DELAY_ERROR") {
        config.crawler.delay_error = parse_delay_range("DELAY_ERROR", &value)?;
    }
    if let Some(value) = get("UNIQ_TYPE") {
        let code: i64 = parse_number("UNIQ_TYPE", &value)?;
        config.crawler.dedup = DedupPolicy::from(code);
    }
    if let Some(value) = get("PROCESSES") {
        config.crawler.processes = parse_number("PROCESSES", &value)?;
    }
    if let Some(value) = get("THREADS") {
        config.crawler.threads = parse_number("THREADS", &value)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| env_error(name, value))
}

/// Parses `min,max`, optionally wrapped in `[]` or `()`
pub fn parse_delay_range(name: &str, value: &str) -> Result<DelayRange, ConfigError> {
    let inner = value
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);

    let mut parts = inner.split(',').map(str::trim);
    let (Some(min), Some(max), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(env_error(name, value));
    };

    Ok(DelayRange(
        parse_number(name, min)?,
        parse_number(name, max)?,
    ))
}

fn env_error(name: &str, value: &str) -> ConfigError {
    ConfigError::Env {
        name: name.to_string(),
        value: value.to_string(),
    }
}
