use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::downloader::AudioCodec;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Storage settings when the upload stage is enabled (a bucket is set).
    pub fn upload_target(&self) -> Option<&StorageConfig> {
        self.storage.as_ref().filter(|s| s.bucket.is_some())
    }
}

/// Playlist catalog (YouTube Data API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// API key sent as the `key` query parameter.
    #[serde(default)]
    pub api_key: String,
    /// API base URL (no trailing `/playlistItems`).
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_catalog_url(),
            timeout_secs: default_catalog_timeout(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_catalog_timeout() -> u32 {
    30
}

/// Download and transcode configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    /// Directory receiving finished artifacts.
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,
    /// Path to the yt-dlp binary.
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
    /// Target audio codec.
    #[serde(default)]
    pub codec: AudioCodec,
    /// Quality passed to the audio extractor (e.g. "192K", or "0" for best VBR).
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
    /// Prefix turning a catalog source id into a downloadable URL.
    #[serde(default = "default_source_url_prefix")]
    pub source_url_prefix: String,
    /// Timeout for a single download+transcode in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
    /// Maximum downloads in flight (1 = strictly sequential).
    #[serde(default = "default_max_parallel")]
    pub max_parallel_downloads: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            target_dir: default_target_dir(),
            ytdlp_path: default_ytdlp_path(),
            codec: AudioCodec::default(),
            audio_quality: default_audio_quality(),
            source_url_prefix: default_source_url_prefix(),
            timeout_secs: default_download_timeout(),
            max_parallel_downloads: default_max_parallel(),
        }
    }
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("downloaded_videos")
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_audio_quality() -> String {
    "192K".to_string()
}

fn default_source_url_prefix() -> String {
    "https://www.youtube.com/watch?v=".to_string()
}

fn default_download_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_max_parallel() -> usize {
    1
}

/// Object storage configuration. The upload stage runs only when `bucket` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    /// Key prefix ("directory") inside the bucket.
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// S3-compatible endpoint; switches to path-style addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds for a single object PUT.
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            directory: String::new(),
            region: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            timeout_secs: default_upload_timeout(),
        }
    }
}

fn default_upload_timeout() -> u64 {
    600
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub catalog: SanitizedCatalogConfig,
    pub downloader: DownloaderConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<SanitizedStorageConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCatalogConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

/// Sanitized storage config (keys hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub access_key_configured: bool,
    pub secret_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            catalog: SanitizedCatalogConfig {
                base_url: config.catalog.base_url.clone(),
                api_key_configured: !config.catalog.api_key.is_empty(),
                timeout_secs: config.catalog.timeout_secs,
            },
            downloader: config.downloader.clone(),
            storage: config.storage.as_ref().map(|s| SanitizedStorageConfig {
                bucket: s.bucket.clone(),
                directory: s.directory.clone(),
                region: s.region.clone(),
                endpoint: s.endpoint.clone(),
                access_key_configured: s.access_key.as_deref().is_some_and(|k| !k.is_empty()),
                secret_key_configured: s.secret_key.as_deref().is_some_and(|k| !k.is_empty()),
            }),
        }
    }
}
