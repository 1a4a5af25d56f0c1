use crate::config::types::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
///
/// Seeds are not checked here: malformed seeds are dropped and counted when
/// the run starts, and only a seed list with no valid entry is fatal.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.worker_count < 1 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be >= 1, got {}",
            config.worker_count
        )));
    }

    if config.frontier_bound < 1 {
        return Err(ConfigError::Validation(format!(
            "frontier-bound must be >= 1, got {}",
            config.frontier_bound
        )));
    }

    if config.max_request_delay < config.min_request_delay {
        return Err(ConfigError::Validation(format!(
            "max-request-delay ({}ms) must be >= min-request-delay ({}ms)",
            config.max_request_delay, config.min_request_delay
        )));
    }

    if config.fetch_timeout == 0 {
        return Err(ConfigError::Validation(
            "fetch-timeout must be > 0ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    // Crawler name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.records_path.is_empty() {
        return Err(ConfigError::Validation(
            "records-path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.summary_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
