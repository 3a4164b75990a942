use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::RawVector;

/// Accepted payload layouts: a list of vectors, one bare vector, or an
/// object carrying a `vectors` list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorPayload {
    Many(Vec<RawVector>),
    Single(RawVector),
    Wrapped { vectors: Vec<RawVector> },
}

impl VectorPayload {
    fn into_vectors(self) -> Vec<RawVector> {
        match self {
            VectorPayload::Many(vectors) | VectorPayload::Wrapped { vectors } => vectors,
            VectorPayload::Single(vector) => vec![vector],
        }
    }
}

pub fn load_vectors(path: &Path) -> AppResult<Vec<RawVector>> {
    let contents = fs::read_to_string(path).map_err(|source| AppError::PayloadRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_vectors(&contents).map_err(|err| AppError::InvalidPayload {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn parse_vectors(contents: &str) -> Result<Vec<RawVector>, serde_json::Error> {
    serde_json::from_str::<VectorPayload>(contents).map(VectorPayload::into_vectors)
}
