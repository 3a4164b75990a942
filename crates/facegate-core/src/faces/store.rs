use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::{
    validate_embeddings, validate_identity_name, Embedding, RawVector,
};
use crate::secret_service::SecretKey;

pub const STORE_DIR_ENV: &str = "FACEGATE_STORE_DIR";
const RECORD_EXTENSION: &str = "json";
const STORE_VERSION: u32 = 1;
const STORE_ALGORITHM: &str = "AES-256-GCM";
const STORE_NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrolledEmbedding {
    pub id: String,
    #[serde(deserialize_with = "deserialize_vector")]
    pub embedding: Vec<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityRecord {
    pub name: String,
    pub embeddings: Vec<EnrolledEmbedding>,
    pub created_at: String,
}

impl IdentityRecord {
    pub fn new(name: &str, embeddings: Vec<Embedding>) -> Self {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let embeddings = embeddings
            .into_iter()
            .map(|embedding| EnrolledEmbedding {
                id: Uuid::new_v4().to_string(),
                embedding: embedding.into_inner(),
                created_at: created_at.clone(),
            })
            .collect();
        Self {
            name: name.to_string(),
            embeddings,
            created_at,
        }
    }

    pub fn vector_count(&self) -> usize {
        self.embeddings.len()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(|entry| entry.embedding.len())
    }
}

fn deserialize_vector<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    RawVector::deserialize(deserializer)?
        .into_values()
        .map_err(serde::de::Error::custom)
}

/// Dimension of the first readable record (in name order) whose vectors
/// agree in length. Every later insert must match it.
pub fn established_dimension<'a, I>(records: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a IdentityRecord>,
{
    records.into_iter().find_map(|record| {
        let dimension = record.dimension().filter(|len| *len > 0)?;
        record
            .embeddings
            .iter()
            .all(|entry| entry.embedding.len() == dimension)
            .then_some(dimension)
    })
}

pub fn ensure_store_dimension(
    record: &IdentityRecord,
    established: Option<usize>,
) -> AppResult<()> {
    match (established, record.dimension()) {
        (Some(expected), Some(found)) if expected != found => Err(AppError::InvalidInput(format!(
            "identity '{}' has vectors of length {found} but the store holds vectors of length {expected}",
            record.name
        ))),
        _ => Ok(()),
    }
}

/// Append-only identity store. `insert` must reject an existing name
/// atomically and must reject vectors whose length differs from the
/// store's established dimension; callers never rely on a prior `find`
/// for uniqueness.
pub trait EmbeddingStore {
    fn insert(&self, record: IdentityRecord) -> AppResult<()>;
    fn find(&self, name: &str) -> AppResult<Option<IdentityRecord>>;
    fn list_all(&self) -> AppResult<Vec<IdentityRecord>>;

    fn established_dimension(&self) -> AppResult<Option<usize>> {
        Ok(established_dimension(&self.list_all()?))
    }

    fn enroll(&self, name: &str, vectors: Vec<RawVector>) -> AppResult<IdentityRecord> {
        validate_identity_name(name)?;
        let embeddings = validate_embeddings(vectors)?;
        let record = IdentityRecord::new(name, embeddings);
        self.insert(record.clone())?;
        debug!(
            target: "store",
            identity = name,
            vectors = record.vector_count(),
            "enrolled identity"
        );
        Ok(record)
    }
}

pub trait StoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

/// Resolution order: explicit override, `$FACEGATE_STORE_DIR`, configured default.
#[derive(Debug, Clone)]
pub struct EnvStoreDirResolver {
    pub configured: PathBuf,
}

impl StoreDirResolver for EnvStoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(env_value) = env::var(STORE_DIR_ENV) {
            PathBuf::from(env_value)
        } else {
            self.configured.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilesystemStore {
    dir: PathBuf,
    key: Option<SecretKey>,
}

impl FilesystemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: None,
        }
    }

    pub fn with_key(dir: impl Into<PathBuf>, key: Option<SecretKey>) -> Self {
        Self {
            dir: dir.into(),
            key,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn read_record(&self, path: &Path) -> AppResult<IdentityRecord> {
        let data = fs::read(path).map_err(|source| AppError::StoreUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        decode_record(path, &data, self.key.as_ref())
    }
}

impl EmbeddingStore for FilesystemStore {
    fn insert(&self, record: IdentityRecord) -> AppResult<()> {
        validate_identity_name(&record.name)?;
        fs::create_dir_all(&self.dir).map_err(|source| AppError::StoreUnavailable {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.record_path(&record.name);
        if path.exists() {
            return Err(AppError::DuplicateIdentity { name: record.name });
        }
        // Two first registrations racing with different lengths can both pass.
        ensure_store_dimension(&record, self.established_dimension()?)?;

        let serialized = encode_record(&record, self.key.as_ref())?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|source| {
            AppError::StoreUnavailable {
                path: path.clone(),
                source,
            }
        })?;

        {
            let file = tmp.as_file_mut();
            {
                let mut writer = BufWriter::new(&mut *file);
                writer
                    .write_all(&serialized)
                    .and_then(|_| writer.write_all(b"\n"))
                    .and_then(|_| writer.flush())
                    .map_err(|source| AppError::StoreUnavailable {
                        path: path.clone(),
                        source,
                    })?;
            }
            restrict_permissions(file).map_err(|source| AppError::StoreUnavailable {
                path: path.clone(),
                source,
            })?;
            file.sync_all().map_err(|source| AppError::StoreUnavailable {
                path: path.clone(),
                source,
            })?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(AppError::DuplicateIdentity { name: record.name })
            }
            Err(err) => Err(AppError::StoreUnavailable {
                path,
                source: err.error,
            }),
        }
    }

    fn find(&self, name: &str) -> AppResult<Option<IdentityRecord>> {
        validate_identity_name(name)?;
        let path = self.record_path(name);
        match fs::metadata(&path) {
            // Case-insensitive filesystems can hand back another name's file.
            Ok(_) => Ok(Some(self.read_record(&path)?).filter(|record| record.name == name)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AppError::StoreUnavailable { path, source }),
        }
    }

    fn list_all(&self) -> AppResult<Vec<IdentityRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AppError::StoreUnavailable {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| AppError::StoreUnavailable {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(stem) = record_stem(&path) else {
                continue;
            };

            match self.read_record(&path) {
                Ok(record) if record.name == stem => records.push(record),
                Ok(record) => warn!(
                    target: "store",
                    path = %path.display(),
                    recorded = %record.name,
                    "skipping record whose name does not match its file"
                ),
                Err(AppError::InvalidStoreRecord { path, message }) => warn!(
                    target: "store",
                    path = %path.display(),
                    %message,
                    "skipping unreadable identity record"
                ),
                Err(err) => return Err(err),
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

fn record_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = file.metadata()?.permissions();
    perms.set_mode(0o600);
    file.set_permissions(perms)
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

fn encode_record(record: &IdentityRecord, key: Option<&SecretKey>) -> AppResult<Vec<u8>> {
    match key {
        Some(key) => serialize_encrypted_record(record, key.as_bytes()),
        None => serde_json::to_vec_pretty(record).map_err(AppError::from),
    }
}

fn decode_record(path: &Path, data: &[u8], key: Option<&SecretKey>) -> AppResult<IdentityRecord> {
    if let Ok(wrapper) = serde_json::from_slice::<EncryptedRecord>(data) {
        let plaintext = decrypt_record(path, wrapper, key)?;
        return parse_record(path, &plaintext);
    }
    parse_record(path, data)
}

fn parse_record(path: &Path, data: &[u8]) -> AppResult<IdentityRecord> {
    serde_json::from_slice(data).map_err(|err| AppError::InvalidStoreRecord {
        path: path.to_path_buf(),
        message: format!("invalid identity record contents: {err}"),
    })
}

fn serialize_encrypted_record(record: &IdentityRecord, key: &[u8]) -> AppResult<Vec<u8>> {
    let plaintext = serde_json::to_vec(record)?;
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| AppError::Encryption("invalid AES-GCM key length".into()))?;
    let mut nonce = [0u8; STORE_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|err| AppError::Encryption(format!("failed to encrypt identity record: {err}")))?;
    let wrapper = EncryptedRecord {
        version: STORE_VERSION,
        algorithm: STORE_ALGORITHM.to_string(),
        nonce: general_purpose::STANDARD.encode(nonce),
        ciphertext: general_purpose::STANDARD.encode(ciphertext),
    };
    serde_json::to_vec_pretty(&wrapper).map_err(AppError::from)
}

fn decrypt_record(
    path: &Path,
    wrapper: EncryptedRecord,
    key: Option<&SecretKey>,
) -> AppResult<Vec<u8>> {
    if wrapper.algorithm != STORE_ALGORITHM {
        return Err(AppError::Encryption(format!(
            "unsupported identity record algorithm '{}'",
            wrapper.algorithm
        )));
    }
    if wrapper.version != STORE_VERSION {
        return Err(AppError::Encryption(format!(
            "unsupported identity record version {}",
            wrapper.version
        )));
    }

    let key = key.ok_or_else(|| AppError::EncryptedStoreRequiresKey {
        path: path.to_path_buf(),
    })?;

    let nonce_bytes = general_purpose::STANDARD
        .decode(wrapper.nonce.trim())
        .map_err(|err| AppError::Encryption(format!("invalid nonce encoding: {err}")))?;
    if nonce_bytes.len() != STORE_NONCE_LEN {
        return Err(AppError::Encryption(format!(
            "expected nonce of {} bytes but found {}",
            STORE_NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let ciphertext = general_purpose::STANDARD
        .decode(wrapper.ciphertext.trim())
        .map_err(|err| AppError::Encryption(format!("invalid ciphertext encoding: {err}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Encryption("invalid AES-GCM key length".into()))?;
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|err| AppError::Encryption(format!("failed to decrypt identity record: {err}")))
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncryptedRecord {
    version: u32,
    algorithm: String,
    nonce: String,
    ciphertext: String,
}

/// Process-local store; the whole map sits behind one lock so inserts are atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, IdentityRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, BTreeMap<String, IdentityRecord>>> {
        self.records.lock().map_err(|err| AppError::StoreUnavailable {
            path: PathBuf::from("memory"),
            source: io::Error::other(err.to_string()),
        })
    }
}

impl EmbeddingStore for MemoryStore {
    fn insert(&self, record: IdentityRecord) -> AppResult<()> {
        let mut records = self.lock()?;
        if records.contains_key(&record.name) {
            return Err(AppError::DuplicateIdentity { name: record.name });
        }
        ensure_store_dimension(&record, established_dimension(records.values()))?;
        records.insert(record.name.clone(), record);
        Ok(())
    }

    fn find(&self, name: &str) -> AppResult<Option<IdentityRecord>> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn list_all(&self) -> AppResult<Vec<IdentityRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

/// Bounds every store operation by a timeout. A timed-out operation keeps
/// running on its worker thread, so a timed-out insert may still commit.
#[derive(Debug)]
pub struct TimedStore<S> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S> TimedStore<S>
where
    S: EmbeddingStore + Send + Sync + 'static,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T, F>(&self, operation: &'static str, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> AppResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("store-{operation}"))
            .spawn(move || {
                let _ = tx.send(op(&inner));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(target: "store", operation, timeout = ?self.timeout, "store operation timed out");
                Err(AppError::StoreTimeout {
                    operation,
                    timeout: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(AppError::StoreUnavailable {
                path: PathBuf::from(operation),
                source: io::Error::other("store worker terminated unexpectedly"),
            }),
        }
    }
}

impl<S> EmbeddingStore for TimedStore<S>
where
    S: EmbeddingStore + Send + Sync + 'static,
{
    fn insert(&self, record: IdentityRecord) -> AppResult<()> {
        self.run("insert", move |store| store.insert(record))
    }

    fn find(&self, name: &str) -> AppResult<Option<IdentityRecord>> {
        let name = name.to_string();
        self.run("find", move |store| store.find(&name))
    }

    fn list_all(&self) -> AppResult<Vec<IdentityRecord>> {
        self.run("list_all", |store| store.list_all())
    }
}
