use std::path::PathBuf;
use std::time::Duration;

use facegate_config::{ResolvedConfig, DEFAULT_TOKEN_TTL_SECS};
use facegate_core::faces::{
    authenticate, list_identities, load_vectors, register, AuthOutcome, EmbeddingStore,
    FilesystemStore, IdentitySummary, Matcher, RegistrationOutcome, SessionClaims, SessionIssuer,
    TimedStore,
};
use facegate_core::secret_service::{
    resolve_signing_key, resolve_store_key, KeyProvider, KeyringSecretService, STORE_KEY_ENV,
};
use tracing::debug;

use crate::cli::{AuthenticateArgs, EngineArgs, IdentitiesArgs, RegisterArgs, TokenVerifyArgs};
use crate::config;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub store_dir: PathBuf,
    pub match_threshold: f64,
    pub token_ttl: Duration,
    pub store_timeout: Duration,
    pub encrypt_store: bool,
    pub config_source: Option<PathBuf>,
}

impl EngineSettings {
    pub fn resolve(args: &EngineArgs) -> AppResult<Self> {
        let loaded = config::load_settings(args.config.as_deref())?;
        let store_dir = config::resolve_store_dir(args.store_dir.as_deref(), &loaded.resolved);
        Ok(Self::from_config(&loaded.resolved, store_dir, loaded.source))
    }

    pub fn from_config(
        config: &ResolvedConfig,
        store_dir: PathBuf,
        config_source: Option<PathBuf>,
    ) -> Self {
        Self {
            store_dir,
            match_threshold: config.match_threshold,
            token_ttl: config.token_ttl,
            store_timeout: config.store_timeout,
            encrypt_store: config.encrypt_store,
            config_source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterReport {
    pub outcome: RegistrationOutcome,
    pub store_dir: PathBuf,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthenticateReport {
    pub outcome: AuthOutcome,
    pub threshold: f64,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentitiesReport {
    pub store_dir: PathBuf,
    pub identities: Vec<IdentitySummary>,
}

#[derive(Debug, Clone)]
pub struct TokenReport {
    pub claims: SessionClaims,
}

/// Opens the filesystem store behind the configured timeout. With
/// `encrypt_store` enabled a store key is mandatory.
pub fn open_store<K: KeyProvider>(
    settings: &EngineSettings,
    keys: &K,
) -> AppResult<TimedStore<FilesystemStore>> {
    let key = if settings.encrypt_store {
        match resolve_store_key(keys)? {
            Some(key) => Some(key),
            None => {
                return Err(AppError::InvalidConfig(format!(
                    "encrypt_store is enabled but no store key is available; set ${STORE_KEY_ENV} or run `facegate keyring init --store-key`"
                )))
            }
        }
    } else {
        None
    };

    debug!(
        store_dir = %settings.store_dir.display(),
        encrypted = key.is_some(),
        timeout = ?settings.store_timeout,
        "opening embedding store"
    );
    Ok(TimedStore::new(
        FilesystemStore::with_key(&settings.store_dir, key),
        settings.store_timeout,
    ))
}

pub fn run_register(args: &RegisterArgs) -> AppResult<RegisterReport> {
    let settings = EngineSettings::resolve(&args.engine)?;
    let store = open_store(&settings, &KeyringSecretService)?;
    run_register_with(args, &settings, &store)
}

pub fn run_register_with<S: EmbeddingStore + ?Sized>(
    args: &RegisterArgs,
    settings: &EngineSettings,
    store: &S,
) -> AppResult<RegisterReport> {
    let mut logs = Vec::new();
    logs.push(format!("Loading vectors from {}", args.vectors.display()));
    let vectors = load_vectors(&args.vectors)?;
    logs.push(format!("Read {} vector(s)", vectors.len()));

    let outcome = register(store, &args.name, vectors)?;
    match &outcome {
        RegistrationOutcome::Created(record) => logs.push(format!(
            "Stored {} vector(s) of length {} for {}",
            record.embedding_ids.len(),
            record.dimension,
            record.name
        )),
        RegistrationOutcome::AlreadyExists { name } => {
            logs.push(format!("Identity {name} is already registered"))
        }
    }
    logs.push(format!("Embedding store: {}", settings.store_dir.display()));

    Ok(RegisterReport {
        outcome,
        store_dir: settings.store_dir.clone(),
        logs,
    })
}

pub fn run_authenticate(args: &AuthenticateArgs) -> AppResult<AuthenticateReport> {
    let settings = EngineSettings::resolve(&args.engine)?;
    let keys = KeyringSecretService;
    let signing_key = resolve_signing_key(&keys)?;
    let issuer = SessionIssuer::new(&signing_key, settings.token_ttl)?;
    let store = open_store(&settings, &keys)?;
    run_authenticate_with(args, &settings, &store, &issuer)
}

pub fn run_authenticate_with<S: EmbeddingStore + ?Sized>(
    args: &AuthenticateArgs,
    settings: &EngineSettings,
    store: &S,
    issuer: &SessionIssuer,
) -> AppResult<AuthenticateReport> {
    let threshold = args.threshold.unwrap_or(settings.match_threshold);
    let matcher = Matcher::new(threshold)?;

    let mut logs = Vec::new();
    logs.push(format!("Loading probe vectors from {}", args.probe.display()));
    let probes = load_vectors(&args.probe)?;
    logs.push(format!(
        "Scoring {} probe(s) with threshold {threshold}",
        probes.len()
    ));

    let outcome = authenticate(store, &matcher, issuer, probes)?;
    match &outcome {
        AuthOutcome::Matched {
            identity, distance, ..
        } => logs.push(format!("Matched {identity} at distance {distance:.4}")),
        AuthOutcome::NoMatch {
            closest_identity,
            distance,
        } => logs.push(format!(
            "Closest identity {closest_identity} at distance {distance:.4} is not below {threshold}"
        )),
        AuthOutcome::EmptyGallery => logs.push(format!(
            "No usable identities in {}",
            settings.store_dir.display()
        )),
    }

    Ok(AuthenticateReport {
        outcome,
        threshold,
        logs,
    })
}

pub fn run_identities(args: &IdentitiesArgs) -> AppResult<IdentitiesReport> {
    let settings = EngineSettings::resolve(&args.engine)?;
    let store = open_store(&settings, &KeyringSecretService)?;
    run_identities_with(&settings, &store)
}

pub fn run_identities_with<S: EmbeddingStore + ?Sized>(
    settings: &EngineSettings,
    store: &S,
) -> AppResult<IdentitiesReport> {
    Ok(IdentitiesReport {
        store_dir: settings.store_dir.clone(),
        identities: list_identities(store)?,
    })
}

pub fn run_token_verify(args: &TokenVerifyArgs) -> AppResult<TokenReport> {
    let key = resolve_signing_key(&KeyringSecretService)?;
    let issuer = SessionIssuer::new(&key, Duration::from_secs(DEFAULT_TOKEN_TTL_SECS))?;
    run_token_verify_with(args, &issuer)
}

pub fn run_token_verify_with(
    args: &TokenVerifyArgs,
    issuer: &SessionIssuer,
) -> AppResult<TokenReport> {
    Ok(TokenReport {
        claims: issuer.verify(&args.token)?,
    })
}
