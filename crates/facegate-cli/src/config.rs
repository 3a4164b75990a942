use std::io;
use std::path::{Path, PathBuf};

use facegate_config::{self, ResolvedConfig, ResolvedConfigWithSource};
use facegate_core::faces::{EnvStoreDirResolver, StoreDirResolver};

use crate::errors::{AppError, AppResult};

/// Loads the configuration from `explicit` when given, otherwise from the
/// first default location that exists. An explicit path must exist.
pub fn load_settings(explicit: Option<&Path>) -> AppResult<ResolvedConfigWithSource> {
    match explicit {
        Some(path) => load_explicit(path),
        None => Ok(facegate_config::load_resolved_config()?),
    }
}

fn load_explicit(path: &Path) -> AppResult<ResolvedConfigWithSource> {
    if !path.exists() {
        return Err(AppError::ConfigRead {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
        });
    }
    Ok(facegate_config::load_resolved_from_paths(&[path.to_path_buf()])?)
}

pub fn resolve_store_dir(cli_value: Option<&Path>, config: &ResolvedConfig) -> PathBuf {
    EnvStoreDirResolver {
        configured: config.embedding_store_dir.clone(),
    }
    .resolve(cli_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn cli_value_wins_over_config() {
        let val = PathBuf::from("/tmp/custom");
        let resolved = resolve_store_dir(Some(&val), &ResolvedConfig::default());
        assert_eq!(resolved, val);
    }

    #[test]
    fn explicit_config_is_used() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "embedding_store_dir = \"/srv/store\"\nmatch_threshold = 0.4\n",
        )
        .unwrap();

        let loaded = load_settings(Some(&config_path)).unwrap();
        assert_eq!(loaded.source, Some(config_path));
        assert_eq!(
            loaded.resolved.embedding_store_dir,
            PathBuf::from("/srv/store")
        );
        assert_eq!(loaded.resolved.match_threshold, 0.4);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");

        let err = load_settings(Some(&config_path)).unwrap_err();
        match err {
            AppError::ConfigRead { path, .. } => assert_eq!(path, config_path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn parse_error_is_reported() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("broken.toml");
        fs::write(&config_path, "embedding_store_dir = { not = 'toml' }").unwrap();

        let err = load_settings(Some(&config_path)).unwrap_err();
        match err {
            AppError::ConfigParse { path, .. } => assert_eq!(path, config_path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_threshold_is_a_configuration_fault() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "match_threshold = -1.0").unwrap();

        let err = load_settings(Some(&config_path)).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::ConfigurationFault);
    }
}
