use tracing::warn;

use super::{types::Config, ConfigError};

/// Validate configuration before any network activity.
///
/// Checks:
/// - catalog API key is set
/// - catalog base URL is http(s)
/// - downloader binary path and target directory are not empty
/// - `max_parallel_downloads` and timeouts are positive
/// - storage bucket, when given, is not blank
///
/// A lone access or secret key is not an error: credential resolution
/// falls back to the ambient chain, and a warning says so.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.catalog.api_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "catalog.api_key is required (or set YOUTUBE_API_KEY)".to_string(),
        ));
    }

    let base_url = &config.catalog.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "catalog.base_url must be an http(s) URL, got '{}'",
            base_url
        )));
    }

    if config.catalog.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "catalog.timeout_secs cannot be 0".to_string(),
        ));
    }

    let downloader = &config.downloader;
    if downloader.ytdlp_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "downloader.ytdlp_path cannot be empty".to_string(),
        ));
    }

    if downloader.target_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "downloader.target_dir cannot be empty".to_string(),
        ));
    }

    if downloader.max_parallel_downloads == 0 {
        return Err(ConfigError::ValidationError(
            "downloader.max_parallel_downloads must be at least 1".to_string(),
        ));
    }

    if downloader.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "downloader.timeout_secs cannot be 0".to_string(),
        ));
    }

    if let Some(storage) = &config.storage {
        if let Some(bucket) = &storage.bucket {
            if bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.bucket cannot be empty".to_string(),
                ));
            }
        }

        let is_set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if is_set(&storage.access_key) != is_set(&storage.secret_key) {
            warn!(
                "Only one of storage.access_key and storage.secret_key is set, using ambient credentials"
            );
        }

        if let Some(endpoint) = &storage.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "storage.endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
        }
    }

    Ok(())
}
