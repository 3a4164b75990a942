use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use facegate_config::ConfigError;
use thiserror::Error;

use crate::secret_service::{KeyLookupError, SecretServiceError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid identity name '{name}': {message}")]
    InvalidIdentityName { name: String, message: String },

    #[error("no probe vectors submitted; capture again")]
    NoProbe,

    #[error("failed to read vector payload {path}: {source}")]
    PayloadRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("vector payload {path} is invalid: {message}")]
    InvalidPayload { path: PathBuf, message: String },

    #[error("identity '{name}' already exists")]
    DuplicateIdentity { name: String },

    #[error("no valid enrolled identities found in the embedding store")]
    EmptyGallery,

    #[error(
        "embedding dimension mismatch against identity '{identity}': expected {expected} values, found {found}"
    )]
    DimensionMismatch {
        identity: String,
        expected: usize,
        found: usize,
    },

    #[error("embedding store record {path} is invalid: {message}")]
    InvalidStoreRecord { path: PathBuf, message: String },

    #[error("embedding store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("embedding store {operation} did not complete within {timeout:?}")]
    StoreTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session signing key missing; set ${env} or run `facegate keyring init`")]
    MissingSigningKey { env: &'static str },

    #[error("secret key invalid: {0}")]
    SecretKeyInvalid(String),

    #[error("Secret Service unavailable for account {account} (service {service}): {message}")]
    SecretServiceUnavailable {
        account: String,
        service: String,
        message: String,
    },

    #[error("embedding store record {path} is encrypted and requires a store key")]
    EncryptedStoreRequiresKey { path: PathBuf },

    #[error("embedding encryption error: {0}")]
    Encryption(String),

    #[error("session token invalid: {0}")]
    TokenInvalid(String),

    #[error("session token for '{identity}' expired at {expired_at}")]
    TokenExpired { identity: String, expired_at: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification used by callers to tell "wrong face" apart from
/// "malformed request" apart from "system unavailable".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    AlreadyExists,
    EmptyGallery,
    DataIntegrity,
    StoreUnavailable,
    ConfigurationFault,
    Token,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_)
            | AppError::InvalidIdentityName { .. }
            | AppError::NoProbe
            | AppError::PayloadRead { .. }
            | AppError::InvalidPayload { .. } => ErrorKind::InvalidInput,
            AppError::DuplicateIdentity { .. } => ErrorKind::AlreadyExists,
            AppError::EmptyGallery => ErrorKind::EmptyGallery,
            AppError::DimensionMismatch { .. } | AppError::InvalidStoreRecord { .. } => {
                ErrorKind::DataIntegrity
            }
            AppError::StoreUnavailable { .. } | AppError::StoreTimeout { .. } => {
                ErrorKind::StoreUnavailable
            }
            AppError::ConfigRead { .. }
            | AppError::ConfigParse { .. }
            | AppError::InvalidConfig(_)
            | AppError::MissingSigningKey { .. }
            | AppError::SecretKeyInvalid(_)
            | AppError::SecretServiceUnavailable { .. }
            | AppError::EncryptedStoreRequiresKey { .. }
            | AppError::Encryption(_) => ErrorKind::ConfigurationFault,
            AppError::TokenInvalid(_) | AppError::TokenExpired { .. } => ErrorKind::Token,
            AppError::Serialization(_) | AppError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Transient failures may succeed when retried by the caller with backoff.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::InvalidInput => ExitCode::from(2),
            ErrorKind::ConfigurationFault => ExitCode::from(2),
            ErrorKind::DataIntegrity => ExitCode::from(3),
            ErrorKind::EmptyGallery => ExitCode::from(4),
            ErrorKind::Token => ExitCode::from(4),
            ErrorKind::AlreadyExists => ExitCode::from(5),
            ErrorKind::StoreUnavailable => ExitCode::from(75),
            ErrorKind::Internal => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
            ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
            ConfigError::Invalid { path, message } => {
                AppError::InvalidConfig(format!("{}: {message}", path.display()))
            }
        }
    }
}

impl From<SecretServiceError> for AppError {
    fn from(err: SecretServiceError) -> Self {
        AppError::SecretServiceUnavailable {
            account: err.account().to_string(),
            service: err.service().to_string(),
            message: err.message().to_string(),
        }
    }
}

impl From<KeyLookupError> for AppError {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::SecretService(inner) => AppError::from(inner),
            KeyLookupError::InvalidFormat { account, reason } => {
                AppError::SecretKeyInvalid(format!("{account}: {reason}"))
            }
        }
    }
}
