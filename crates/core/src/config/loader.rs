use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ingest.toml";

/// Environment variables understood by the original shell deployment,
/// mapped onto their config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("YOUTUBE_API_KEY", "catalog.api_key"),
    ("AWS_ACCESS_KEY", "storage.access_key"),
    ("AWS_SECRET_KEY", "storage.secret_key"),
    ("S3_REGION_NAME", "storage.region"),
    ("S3_BUCKET_NAME", "storage.bucket"),
    ("S3_STORE_PATH", "storage.directory"),
];

/// Load configuration with layered overrides.
///
/// Layers, lowest priority first: serde defaults, the TOML file (explicit
/// `path`, else `ingest.toml` if present), legacy environment variables,
/// then `INGEST_`-prefixed variables using `__` for nesting
/// (`INGEST_DOWNLOADER__TARGET_DIR`).
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::new();

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }
    }

    let config: Config = figment
        .merge(legacy_env())
        .merge(Env::prefixed("INGEST_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();

    Env::raw().only(&names).map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| path.to_string())
            .unwrap_or_else(|| key.as_str().to_string())
            .into()
    })
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
