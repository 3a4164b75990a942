use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::{validate_embeddings, validate_identity_name, RawVector};
use crate::faces::store::{ensure_store_dimension, EmbeddingStore, IdentityRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRecord {
    pub name: String,
    pub embedding_ids: Vec<String>,
    pub dimension: usize,
    pub created_at: String,
}

impl EnrollmentRecord {
    fn from_record(record: &IdentityRecord, dimension: usize) -> Self {
        Self {
            name: record.name.clone(),
            embedding_ids: record.embeddings.iter().map(|e| e.id.clone()).collect(),
            dimension,
            created_at: record.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Created(EnrollmentRecord),
    AlreadyExists { name: String },
}

impl RegistrationOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, RegistrationOutcome::Created(_))
    }
}

/// Validates and commits a new identity. An existing name is an outcome,
/// not an error, whether it is seen up front or lost in a concurrent race.
/// Vectors must match the length of those already enrolled.
pub fn register<S: EmbeddingStore + ?Sized>(
    store: &S,
    name: &str,
    vectors: Vec<RawVector>,
) -> AppResult<RegistrationOutcome> {
    validate_identity_name(name)?;
    let embeddings = validate_embeddings(vectors)?;
    let dimension = embeddings.first().map(|e| e.dimension()).unwrap_or_default();

    let taken = match store.find(name) {
        Ok(existing) => existing.is_some(),
        // The name's file exists, so the insert could never succeed.
        Err(AppError::InvalidStoreRecord { path, message }) => {
            warn!(
                target: "enrollment",
                identity = name,
                path = %path.display(),
                %message,
                "identity name is held by an unreadable record"
            );
            true
        }
        Err(err) => return Err(err),
    };
    if taken {
        info!(target: "enrollment", identity = name, "identity already registered");
        return Ok(RegistrationOutcome::AlreadyExists {
            name: name.to_string(),
        });
    }

    let record = IdentityRecord::new(name, embeddings);
    ensure_store_dimension(&record, store.established_dimension()?)?;
    match store.insert(record.clone()) {
        Ok(()) => {
            info!(
                target: "enrollment",
                identity = name,
                vectors = record.vector_count(),
                dimension,
                "identity registered"
            );
            Ok(RegistrationOutcome::Created(EnrollmentRecord::from_record(
                &record, dimension,
            )))
        }
        Err(AppError::DuplicateIdentity { name }) => {
            warn!(target: "enrollment", identity = %name, "lost concurrent registration race");
            Ok(RegistrationOutcome::AlreadyExists { name })
        }
        Err(err) => Err(err),
    }
}
