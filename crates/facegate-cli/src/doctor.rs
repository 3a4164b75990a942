use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use facegate_config::{
    self, ConfigError, ResolvedConfig, ResolvedConfigWithSource, PRIMARY_CONFIG_PATH,
    SECONDARY_CONFIG_PATH,
};
use facegate_core::secret_service::{
    default_service_name, ensure_secret_service_available, resolve_signing_key_with,
    resolve_store_key_with, KeyProvider, KeyringSecretService, SecretServiceProbe,
    SIGNING_KEY_ACCOUNT, SIGNING_KEY_ENV, STORE_KEY_ENV,
};
use serde::Serialize;

use crate::config;
use crate::errors::AppResult;

const CHECK_CONFIG: &str = "config";
const CHECK_STORE_DIR: &str = "embedding_store_dir";
const CHECK_SECRET_SERVICE: &str = "secret_service";
const CHECK_SIGNING_KEY: &str = "signing_key";
const CHECK_STORE_KEY: &str = "store_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            path: None,
        }
    }

    fn at(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorOutcome {
    pub ok: bool,
    pub checks: Vec<DoctorCheck>,
}

#[derive(Clone)]
pub struct DoctorPaths {
    pub config_paths: Vec<PathBuf>,
}

impl Default for DoctorPaths {
    fn default() -> Self {
        Self {
            config_paths: vec![
                PathBuf::from(PRIMARY_CONFIG_PATH),
                PathBuf::from(SECONDARY_CONFIG_PATH),
            ],
        }
    }
}

pub struct DoctorContext<P, K> {
    pub paths: DoctorPaths,
    pub secret_service_probe: P,
    pub key_provider: K,
    pub signing_key_env: Option<String>,
    pub store_key_env: Option<String>,
    pub fallback_config: ResolvedConfig,
}

impl Default for DoctorContext<KeyringSecretService, KeyringSecretService> {
    fn default() -> Self {
        Self {
            paths: DoctorPaths::default(),
            secret_service_probe: KeyringSecretService,
            key_provider: KeyringSecretService,
            signing_key_env: env::var(SIGNING_KEY_ENV).ok(),
            store_key_env: env::var(STORE_KEY_ENV).ok(),
            fallback_config: ResolvedConfig::default(),
        }
    }
}

pub fn run_doctor() -> AppResult<DoctorOutcome> {
    let ctx = DoctorContext::default();
    run_doctor_with(&ctx)
}

/// Warnings do not fail the run; any failed check does.
pub fn run_doctor_with<P, K>(ctx: &DoctorContext<P, K>) -> AppResult<DoctorOutcome>
where
    P: SecretServiceProbe,
    K: KeyProvider,
{
    let (config_check, resolved) = check_config(&ctx.paths, &ctx.fallback_config);

    let checks = vec![
        config_check,
        check_store_dir(&config::resolve_store_dir(None, &resolved.resolved)),
        check_secret_service(&ctx.secret_service_probe),
        check_signing_key(ctx.signing_key_env.clone(), &ctx.key_provider),
        check_store_key(
            resolved.resolved.encrypt_store,
            ctx.store_key_env.clone(),
            &ctx.key_provider,
        ),
    ];

    let ok = checks.iter().all(|c| c.status != CheckStatus::Fail);
    Ok(DoctorOutcome { ok, checks })
}

fn check_config(
    paths: &DoctorPaths,
    fallback: &ResolvedConfig,
) -> (DoctorCheck, ResolvedConfigWithSource) {
    let fallback_resolved = || ResolvedConfigWithSource {
        resolved: fallback.clone(),
        source: None,
    };

    match facegate_config::load_resolved_from_paths(&paths.config_paths) {
        Ok(resolved) => match resolved.source.clone() {
            Some(source) => {
                let shadowed = paths
                    .config_paths
                    .iter()
                    .filter(|p| **p != source && p.exists())
                    .count();
                let check = if shadowed > 0 {
                    DoctorCheck::new(
                        CHECK_CONFIG,
                        CheckStatus::Warn,
                        format!(
                            "Multiple config files exist; using {}",
                            source.display()
                        ),
                    )
                } else {
                    DoctorCheck::new(
                        CHECK_CONFIG,
                        CheckStatus::Pass,
                        format!("Loaded config from {}", source.display()),
                    )
                };
                (check.at(&source), resolved)
            }
            None => (
                DoctorCheck::new(
                    CHECK_CONFIG,
                    CheckStatus::Warn,
                    format!(
                        "No config file found (tried {}); using built-in defaults",
                        display_paths(&paths.config_paths)
                    ),
                ),
                fallback_resolved(),
            ),
        },
        Err(ConfigError::Parse { path, message }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to parse {}: {}", path.display(), message),
            )
            .at(&path),
            fallback_resolved(),
        ),
        Err(ConfigError::Invalid { path, message }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Invalid values in {}: {}", path.display(), message),
            )
            .at(&path),
            fallback_resolved(),
        ),
        Err(ConfigError::Read { path, source }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to read {}: {}", path.display(), source),
            )
            .at(&path),
            fallback_resolved(),
        ),
    }
}

fn check_store_dir(path: &Path) -> DoctorCheck {
    let check = match (path.exists(), path.is_dir()) {
        (false, _) => DoctorCheck::new(
            CHECK_STORE_DIR,
            CheckStatus::Warn,
            format!(
                "Embedding store {} missing; it is created on first registration",
                path.display()
            ),
        ),
        (true, false) => DoctorCheck::new(
            CHECK_STORE_DIR,
            CheckStatus::Fail,
            format!("Embedding store {} is not a directory", path.display()),
        ),
        (true, true) => {
            let readable = fs::read_dir(path).is_ok();
            let writeable = tempfile::tempfile_in(path).is_ok();
            if readable && writeable {
                DoctorCheck::new(
                    CHECK_STORE_DIR,
                    CheckStatus::Pass,
                    format!("Embedding store {} is readable/writable", path.display()),
                )
            } else {
                DoctorCheck::new(
                    CHECK_STORE_DIR,
                    CheckStatus::Fail,
                    format!(
                        "Embedding store {} lacks {} permissions",
                        path.display(),
                        if !readable && !writeable {
                            "read/write"
                        } else if !readable {
                            "read"
                        } else {
                            "write"
                        }
                    ),
                )
            }
        }
    };
    check.at(path)
}

fn check_secret_service<P: SecretServiceProbe>(probe: &P) -> DoctorCheck {
    match ensure_secret_service_available(probe, SIGNING_KEY_ACCOUNT) {
        Ok(_) => DoctorCheck::new(
            CHECK_SECRET_SERVICE,
            CheckStatus::Pass,
            format!(
                "Secret Service available (service {})",
                default_service_name()
            ),
        ),
        Err(err) => DoctorCheck::new(CHECK_SECRET_SERVICE, CheckStatus::Fail, err.to_string()),
    }
}

fn check_signing_key<K: KeyProvider>(env_value: Option<String>, provider: &K) -> DoctorCheck {
    let from_env = env_value
        .as_deref()
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    match resolve_signing_key_with(env_value, provider) {
        Ok(key) => DoctorCheck::new(
            CHECK_SIGNING_KEY,
            CheckStatus::Pass,
            format!(
                "Session signing key ({} bytes) resolved from {}",
                key.len(),
                if from_env {
                    format!("${SIGNING_KEY_ENV}")
                } else {
                    "the Secret Service".to_string()
                }
            ),
        ),
        Err(err) => DoctorCheck::new(CHECK_SIGNING_KEY, CheckStatus::Fail, err.human_message()),
    }
}

fn check_store_key<K: KeyProvider>(
    encrypt_store: bool,
    env_value: Option<String>,
    provider: &K,
) -> DoctorCheck {
    if !encrypt_store {
        return DoctorCheck::new(
            CHECK_STORE_KEY,
            CheckStatus::Pass,
            "Encryption at rest disabled (encrypt_store = false)",
        );
    }
    match resolve_store_key_with(env_value, provider) {
        Ok(Some(_)) => DoctorCheck::new(
            CHECK_STORE_KEY,
            CheckStatus::Pass,
            "Store encryption key available",
        ),
        Ok(None) => DoctorCheck::new(
            CHECK_STORE_KEY,
            CheckStatus::Fail,
            format!(
                "encrypt_store is enabled but no key found; set ${STORE_KEY_ENV} or run `facegate keyring init --store-key`"
            ),
        ),
        Err(err) => DoctorCheck::new(CHECK_STORE_KEY, CheckStatus::Fail, err.human_message()),
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
