use std::env;
use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use keyring::{error::Error as KeyringError, Entry};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{AppError, AppResult};

const DEFAULT_SERVICE_NAME: &str = "facegate";
pub const SIGNING_KEY_ACCOUNT: &str = "session-signing-key";
pub const STORE_KEY_ACCOUNT: &str = "store-key";
pub const SIGNING_KEY_ENV: &str = "FACEGATE_SECRET_KEY";
pub const STORE_KEY_ENV: &str = "FACEGATE_STORE_KEY";
pub const MIN_SIGNING_KEY_BYTES: usize = 32;
pub const AES_GCM_KEY_BYTES: usize = 32;

#[derive(Debug, Error, Clone)]
#[error("Secret Service unavailable for account '{account}' (service '{service}'): {message}")]
pub struct SecretServiceError {
    account: String,
    service: String,
    message: String,
}

impl SecretServiceError {
    pub fn new(
        account: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error, Clone)]
pub enum KeyLookupError {
    #[error(transparent)]
    SecretService(#[from] SecretServiceError),
    #[error("Secret Service entry '{account}' stored an invalid key: {reason}")]
    InvalidFormat { account: String, reason: String },
}

/// Key material held in process memory; wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {} bytes])", self.bytes.len())
    }
}

#[derive(Debug, Clone)]
pub enum KeyStatus {
    Present(SecretKey),
    Missing,
}

pub trait SecretServiceProbe {
    fn check(&self, account: &str) -> Result<(), SecretServiceError>;
}

pub trait KeyProvider {
    fn fetch(&self, account: &str) -> Result<KeyStatus, KeyLookupError>;
    fn store(&self, account: &str, key: &SecretKey) -> Result<(), SecretServiceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringSecretService;

impl SecretServiceProbe for KeyringSecretService {
    fn check(&self, account: &str) -> Result<(), SecretServiceError> {
        let entry = open_entry(account)?;
        match entry.get_password() {
            Ok(_) | Err(KeyringError::NoEntry) => Ok(()),
            Err(err) => Err(SecretServiceError::new(
                account,
                DEFAULT_SERVICE_NAME,
                describe_keyring_error(&err),
            )),
        }
    }
}

impl KeyProvider for KeyringSecretService {
    fn fetch(&self, account: &str) -> Result<KeyStatus, KeyLookupError> {
        let entry = open_entry(account)?;
        match entry.get_password() {
            Ok(secret) => decode_key(account, &secret).map(KeyStatus::Present),
            Err(KeyringError::NoEntry) => Ok(KeyStatus::Missing),
            Err(err) => Err(KeyLookupError::SecretService(SecretServiceError::new(
                account,
                DEFAULT_SERVICE_NAME,
                describe_keyring_error(&err),
            ))),
        }
    }

    fn store(&self, account: &str, key: &SecretKey) -> Result<(), SecretServiceError> {
        let entry = open_entry(account)?;
        entry.set_password(&key.to_base64()).map_err(|err| {
            SecretServiceError::new(account, DEFAULT_SERVICE_NAME, describe_keyring_error(&err))
        })
    }
}

pub fn ensure_secret_service_available<P: SecretServiceProbe>(
    probe: &P,
    account: &str,
) -> Result<(), SecretServiceError> {
    probe.check(account)
}

pub fn default_service_name() -> &'static str {
    DEFAULT_SERVICE_NAME
}

/// Resolves the session signing key: environment first, then the Secret Service.
pub fn resolve_signing_key<P: KeyProvider>(provider: &P) -> AppResult<SecretKey> {
    resolve_signing_key_with(env::var(SIGNING_KEY_ENV).ok(), provider)
}

pub fn resolve_signing_key_with<P: KeyProvider>(
    env_value: Option<String>,
    provider: &P,
) -> AppResult<SecretKey> {
    let key = match env_value.filter(|value| !value.trim().is_empty()) {
        Some(value) => SecretKey::from_bytes(value.into_bytes()),
        None => match provider.fetch(SIGNING_KEY_ACCOUNT)? {
            KeyStatus::Present(key) => key,
            KeyStatus::Missing => {
                return Err(AppError::MissingSigningKey {
                    env: SIGNING_KEY_ENV,
                })
            }
        },
    };

    if key.len() < MIN_SIGNING_KEY_BYTES {
        return Err(AppError::SecretKeyInvalid(format!(
            "expected at least {MIN_SIGNING_KEY_BYTES} bytes but found {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Resolves the optional at-rest store key: environment first, then the Secret Service.
pub fn resolve_store_key<P: KeyProvider>(provider: &P) -> AppResult<Option<SecretKey>> {
    resolve_store_key_with(env::var(STORE_KEY_ENV).ok(), provider)
}

pub fn resolve_store_key_with<P: KeyProvider>(
    env_value: Option<String>,
    provider: &P,
) -> AppResult<Option<SecretKey>> {
    if let Some(value) = env_value.filter(|value| !value.trim().is_empty()) {
        let key = decode_key(STORE_KEY_ENV, &value)?;
        return ensure_aes_key(STORE_KEY_ENV, key).map(Some);
    }
    match provider.fetch(STORE_KEY_ACCOUNT)? {
        KeyStatus::Present(key) => ensure_aes_key(STORE_KEY_ACCOUNT, key).map(Some),
        KeyStatus::Missing => Ok(None),
    }
}

fn ensure_aes_key(account: &str, key: SecretKey) -> AppResult<SecretKey> {
    if key.len() != AES_GCM_KEY_BYTES {
        return Err(AppError::from(KeyLookupError::InvalidFormat {
            account: account.to_string(),
            reason: format!(
                "expected {AES_GCM_KEY_BYTES} bytes but found {}",
                key.len()
            ),
        }));
    }
    Ok(key)
}

fn open_entry(account: &str) -> Result<Entry, SecretServiceError> {
    Entry::new(DEFAULT_SERVICE_NAME, account).map_err(|err| {
        SecretServiceError::new(
            account,
            DEFAULT_SERVICE_NAME,
            format!("failed to create keyring entry: {err}"),
        )
    })
}

fn describe_keyring_error(err: &KeyringError) -> String {
    match err {
        KeyringError::NoStorageAccess(inner) => {
            format!("Secret Service locked or unavailable: {inner}")
        }
        KeyringError::PlatformFailure(inner) => {
            format!("Secret Service platform failure: {inner}")
        }
        KeyringError::TooLong(attr, limit) => {
            format!("Secret Service attribute '{attr}' exceeded platform limit {limit}")
        }
        KeyringError::Invalid(attr, reason) => {
            format!("Secret Service attribute {attr} invalid: {reason}")
        }
        KeyringError::Ambiguous(items) => format!(
            "Secret Service returned {} matching credentials",
            items.len()
        ),
        KeyringError::BadEncoding(_) => "Secret Service returned a non-UTF8 secret".into(),
        KeyringError::NoEntry => "Secret Service reported no entry".into(),
        _ => format!("Secret Service error: {err}"),
    }
}

fn decode_key(account: &str, secret: &str) -> Result<SecretKey, KeyLookupError> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(KeyLookupError::InvalidFormat {
            account: account.to_string(),
            reason: "stored secret was empty".into(),
        });
    }

    general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .map(SecretKey::from_bytes)
        .map_err(|err| KeyLookupError::InvalidFormat {
            account: account.to_string(),
            reason: format!("base64 decode failed: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Clone)]
    struct StubProbe {
        result: Result<(), SecretServiceError>,
    }

    impl SecretServiceProbe for StubProbe {
        fn check(&self, _account: &str) -> Result<(), SecretServiceError> {
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct MapProvider {
        keys: RefCell<HashMap<String, SecretKey>>,
    }

    impl KeyProvider for MapProvider {
        fn fetch(&self, account: &str) -> Result<KeyStatus, KeyLookupError> {
            Ok(match self.keys.borrow().get(account) {
                Some(key) => KeyStatus::Present(key.clone()),
                None => KeyStatus::Missing,
            })
        }

        fn store(&self, account: &str, key: &SecretKey) -> Result<(), SecretServiceError> {
            self.keys
                .borrow_mut()
                .insert(account.to_string(), key.clone());
            Ok(())
        }
    }

    #[test]
    fn ensure_secret_service_available_propagates_failure() {
        let probe = StubProbe {
            result: Err(SecretServiceError::new(
                SIGNING_KEY_ACCOUNT,
                DEFAULT_SERVICE_NAME,
                "locked",
            )),
        };
        let err = ensure_secret_service_available(&probe, SIGNING_KEY_ACCOUNT).unwrap_err();
        assert!(err.message().contains("locked"));
        assert_eq!(err.account(), SIGNING_KEY_ACCOUNT);
        assert_eq!(err.service(), DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn signing_key_prefers_environment() {
        let provider = MapProvider::default();
        provider
            .store(SIGNING_KEY_ACCOUNT, &SecretKey::generate(64))
            .unwrap();
        let env_secret = "x".repeat(40);
        let key = resolve_signing_key_with(Some(env_secret.clone()), &provider).unwrap();
        assert_eq!(key.as_bytes(), env_secret.as_bytes());
    }

    #[test]
    fn signing_key_falls_back_to_secret_service() {
        let provider = MapProvider::default();
        let stored = SecretKey::generate(32);
        provider.store(SIGNING_KEY_ACCOUNT, &stored).unwrap();
        let key = resolve_signing_key_with(None, &provider).unwrap();
        assert_eq!(key, stored);
    }

    #[test]
    fn missing_signing_key_is_a_configuration_fault() {
        let err = resolve_signing_key_with(None, &MapProvider::default()).unwrap_err();
        assert!(matches!(err, AppError::MissingSigningKey { .. }));
    }

    #[test]
    fn short_signing_key_is_rejected() {
        let err =
            resolve_signing_key_with(Some("short".into()), &MapProvider::default()).unwrap_err();
        assert!(matches!(err, AppError::SecretKeyInvalid(_)));
    }

    #[test]
    fn store_key_is_optional_and_checked() {
        let provider = MapProvider::default();
        assert!(resolve_store_key_with(None, &provider).unwrap().is_none());

        let encoded = general_purpose::STANDARD.encode([0x11u8; AES_GCM_KEY_BYTES]);
        let key = resolve_store_key_with(Some(encoded), &provider)
            .unwrap()
            .unwrap();
        assert_eq!(key.len(), AES_GCM_KEY_BYTES);

        let short = general_purpose::STANDARD.encode([0x11u8; 4]);
        assert!(resolve_store_key_with(Some(short), &provider).is_err());
    }

    #[test]
    fn decode_key_rejects_garbage() {
        let err = decode_key("store-key", "***").unwrap_err();
        match err {
            KeyLookupError::InvalidFormat { account, reason } => {
                assert_eq!(account, "store-key");
                assert!(reason.contains("base64"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let key = SecretKey::from_bytes(vec![0xAB; 32]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
