use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_STORE_DIR: &str = "/var/lib/facegate/identities";
pub const DEFAULT_STORE_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub match_threshold: Option<f64>,
    pub token_ttl_secs: Option<u64>,
    pub embedding_store_dir: Option<PathBuf>,
    pub store_timeout_millis: Option<u64>,
    pub encrypt_store: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub match_threshold: f64,
    pub token_ttl: Duration,
    pub embedding_store_dir: PathBuf,
    pub store_timeout: Duration,
    pub encrypt_store: bool,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            match_threshold: raw.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            token_ttl: Duration::from_secs(
                raw.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS).max(1),
            ),
            embedding_store_dir: raw
                .embedding_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            store_timeout: Duration::from_millis(
                raw.store_timeout_millis
                    .unwrap_or(DEFAULT_STORE_TIMEOUT_MILLIS)
                    .max(1),
            ),
            encrypt_store: raw.encrypt_store.unwrap_or(false),
        }
    }

    /// Rejects values that would make every match decision meaningless.
    pub fn validate(&self) -> Result<(), String> {
        validate_threshold(self.match_threshold)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

pub fn validate_threshold(threshold: f64) -> Result<(), String> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(format!(
            "match_threshold must be a positive finite distance, got {threshold}"
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

pub fn default_config_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_config() -> Result<Option<LoadedConfig>, ConfigError> {
    load_from_paths(&default_config_paths())
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_config_paths())
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let resolved = ResolvedConfig::from_raw(entry.contents);
            resolved
                .validate()
                .map_err(|message| ConfigError::Invalid {
                    path: entry.source.clone(),
                    message,
                })?;
            Ok(ResolvedConfigWithSource {
                resolved,
                source: Some(entry.source),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
