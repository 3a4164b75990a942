use facegate_core::secret_service::{
    default_service_name, ensure_secret_service_available, KeyLookupError, KeyProvider, KeyStatus,
    KeyringSecretService, SecretKey, SecretServiceProbe, AES_GCM_KEY_BYTES, SIGNING_KEY_ACCOUNT,
    STORE_KEY_ACCOUNT,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{KeyringCommands, KeyringInitArgs};
use crate::errors::AppResult;

const GENERATED_SIGNING_KEY_BYTES: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct KeyringCheckSummary {
    pub account: String,
    pub service: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyringInitSummary {
    pub service: String,
    pub written: Vec<String>,
    pub kept: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum KeyringOutcome {
    Check(KeyringCheckSummary),
    Init(KeyringInitSummary),
}

pub fn run_keyring(command: &KeyringCommands) -> AppResult<KeyringOutcome> {
    match command {
        KeyringCommands::Check(_) => run_keyring_check().map(KeyringOutcome::Check),
        KeyringCommands::Init(args) => run_keyring_init(args).map(KeyringOutcome::Init),
    }
}

pub fn run_keyring_check() -> AppResult<KeyringCheckSummary> {
    check_with_probe(&KeyringSecretService, SIGNING_KEY_ACCOUNT)
}

pub fn check_with_probe<P: SecretServiceProbe>(
    probe: &P,
    account: &str,
) -> AppResult<KeyringCheckSummary> {
    ensure_secret_service_available(probe, account)?;
    Ok(KeyringCheckSummary {
        account: account.to_string(),
        service: default_service_name().to_string(),
    })
}

pub fn run_keyring_init(args: &KeyringInitArgs) -> AppResult<KeyringInitSummary> {
    init_with_provider(&KeyringSecretService, args)
}

/// Generates missing keys. Existing keys are kept unless `force` is set.
pub fn init_with_provider<K: KeyProvider>(
    provider: &K,
    args: &KeyringInitArgs,
) -> AppResult<KeyringInitSummary> {
    let mut wanted = vec![(SIGNING_KEY_ACCOUNT, GENERATED_SIGNING_KEY_BYTES)];
    if args.store_key {
        wanted.push((STORE_KEY_ACCOUNT, AES_GCM_KEY_BYTES));
    }

    let mut summary = KeyringInitSummary {
        service: default_service_name().to_string(),
        ..KeyringInitSummary::default()
    };
    for (account, len) in wanted {
        let exists = match provider.fetch(account) {
            Ok(KeyStatus::Present(_)) => true,
            Ok(KeyStatus::Missing) => false,
            Err(KeyLookupError::InvalidFormat { reason, .. }) => {
                warn!(account, %reason, "replacing unreadable key");
                false
            }
            Err(err) => return Err(err.into()),
        };
        if exists && !args.force {
            summary.kept.push(account.to_string());
            continue;
        }
        provider.store(account, &SecretKey::generate(len))?;
        info!(account, service = %summary.service, "stored generated key");
        summary.written.push(account.to_string());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use facegate_core::secret_service::SecretServiceError;
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
    fn check_with_probe_returns_summary_on_success() {
        let probe = StubProbe { result: Ok(()) };
        let summary = check_with_probe(&probe, SIGNING_KEY_ACCOUNT).unwrap();
        assert_eq!(summary.account, SIGNING_KEY_ACCOUNT);
        assert_eq!(summary.service, default_service_name());
    }

    #[test]
    fn check_with_probe_maps_error_to_app_error() {
        let probe = StubProbe {
            result: Err(SecretServiceError::new(
                SIGNING_KEY_ACCOUNT,
                default_service_name(),
                "locked",
            )),
        };
        let err = check_with_probe(&probe, SIGNING_KEY_ACCOUNT).unwrap_err();
        match err {
            AppError::SecretServiceUnavailable {
                account,
                service,
                message,
            } => {
                assert_eq!(account, SIGNING_KEY_ACCOUNT);
                assert_eq!(service, default_service_name());
                assert!(message.contains("locked"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn init_generates_missing_keys_and_keeps_existing() {
        let provider = MapProvider::default();
        let args = KeyringInitArgs {
            force: false,
            store_key: true,
        };

        let first = init_with_provider(&provider, &args).unwrap();
        assert_eq!(first.written, vec![SIGNING_KEY_ACCOUNT, STORE_KEY_ACCOUNT]);
        let signing = provider.keys.borrow()[SIGNING_KEY_ACCOUNT].clone();
        assert_eq!(signing.len(), GENERATED_SIGNING_KEY_BYTES);
        assert_eq!(
            provider.keys.borrow()[STORE_KEY_ACCOUNT].len(),
            AES_GCM_KEY_BYTES
        );

        let second = init_with_provider(&provider, &args).unwrap();
        assert!(second.written.is_empty());
        assert_eq!(second.kept.len(), 2);
        assert_eq!(provider.keys.borrow()[SIGNING_KEY_ACCOUNT], signing);
    }

    #[test]
    fn init_with_force_rotates() {
        let provider = MapProvider::default();
        let original = SecretKey::generate(GENERATED_SIGNING_KEY_BYTES);
        provider.store(SIGNING_KEY_ACCOUNT, &original).unwrap();

        let summary = init_with_provider(
            &provider,
            &KeyringInitArgs {
                force: true,
                store_key: false,
            },
        )
        .unwrap();
        assert_eq!(summary.written, vec![SIGNING_KEY_ACCOUNT]);
        assert_ne!(provider.keys.borrow()[SIGNING_KEY_ACCOUNT], original);
    }
}
