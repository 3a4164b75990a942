use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const MAX_IDENTITY_NAME_LEN: usize = 64;

/// A face embedding: non-empty, finite, fixed length once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    pub fn new(values: Vec<f64>) -> AppResult<Self> {
        if values.is_empty() {
            return Err(AppError::InvalidInput(
                "embedding vector must not be empty".into(),
            ));
        }
        if let Some(index) = values.iter().position(|value| !value.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "embedding component {index} is not a finite number"
            )));
        }
        Ok(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for Embedding {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for Embedding {
    type Error = AppError;

    fn try_from(values: Vec<f64>) -> AppResult<Self> {
        Embedding::new(values)
    }
}

/// Wire shapes a vector may arrive in. Serialized typed arrays show up as
/// objects keyed by their decimal indices.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawVector {
    List(Vec<f64>),
    Indexed(BTreeMap<String, f64>),
}

impl RawVector {
    pub fn into_values(self) -> AppResult<Vec<f64>> {
        match self {
            RawVector::List(values) => Ok(values),
            RawVector::Indexed(map) => {
                let mut indexed = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let index = key.parse::<usize>().map_err(|_| {
                        AppError::InvalidInput(format!(
                            "vector key '{key}' is not a component index"
                        ))
                    })?;
                    indexed.push((index, value));
                }
                indexed.sort_by_key(|(index, _)| *index);
                for (expected, (index, _)) in indexed.iter().enumerate() {
                    if *index != expected {
                        return Err(AppError::InvalidInput(format!(
                            "vector index map is missing component {expected}"
                        )));
                    }
                }
                Ok(indexed.into_iter().map(|(_, value)| value).collect())
            }
        }
    }

    pub fn into_embedding(self) -> AppResult<Embedding> {
        Embedding::new(self.into_values()?)
    }
}

impl From<Vec<f64>> for RawVector {
    fn from(values: Vec<f64>) -> Self {
        RawVector::List(values)
    }
}

pub fn validate_identity_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::InvalidIdentityName {
            name: name.to_string(),
            message: "identity name cannot be empty".into(),
        });
    }

    if name.len() > MAX_IDENTITY_NAME_LEN {
        return Err(AppError::InvalidIdentityName {
            name: name.to_string(),
            message: format!("identity name exceeds {MAX_IDENTITY_NAME_LEN} characters"),
        });
    }

    if name.starts_with('.') {
        return Err(AppError::InvalidIdentityName {
            name: name.to_string(),
            message: "identity name cannot start with '.'".into(),
        });
    }

    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Err(AppError::InvalidIdentityName {
            name: name.to_string(),
            message: "use ASCII letters, numbers, '-', '_' or '.' only".into(),
        });
    }

    Ok(())
}

/// Converts submitted vectors into embeddings sharing one dimensionality.
pub fn validate_embeddings(vectors: Vec<RawVector>) -> AppResult<Vec<Embedding>> {
    if vectors.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one embedding vector is required".into(),
        ));
    }

    let embeddings = vectors
        .into_iter()
        .map(RawVector::into_embedding)
        .collect::<AppResult<Vec<_>>>()?;
    ensure_uniform_dimension(&embeddings)?;
    Ok(embeddings)
}

pub fn ensure_uniform_dimension(embeddings: &[Embedding]) -> AppResult<usize> {
    let expected = embeddings
        .first()
        .map(Embedding::dimension)
        .ok_or_else(|| AppError::InvalidInput("no embedding vectors supplied".into()))?;
    if let Some(other) = embeddings.iter().find(|e| e.dimension() != expected) {
        return Err(AppError::InvalidInput(format!(
            "embedding length mismatch: expected {expected} values, found {}",
            other.dimension()
        )));
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_rejects_empty_and_non_finite() {
        assert!(matches!(
            Embedding::new(vec![]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(Embedding::new(vec![0.1, f64::NAN]).is_err());
        assert!(Embedding::new(vec![f64::INFINITY]).is_err());
        assert_eq!(Embedding::new(vec![0.1, 0.2]).unwrap().dimension(), 2);
    }

    #[test]
    fn indexed_vectors_are_ordered_by_index() {
        let raw: RawVector = serde_json::from_str(r#"{"1": 0.5, "0": 0.25, "2": 1.0}"#).unwrap();
        assert_eq!(raw.into_values().unwrap(), vec![0.25, 0.5, 1.0]);

        let ten: RawVector = serde_json::from_str(
            r#"{"0":0,"1":1,"2":2,"3":3,"4":4,"5":5,"6":6,"7":7,"8":8,"9":9,"10":10}"#,
        )
        .unwrap();
        let values = ten.into_values().unwrap();
        assert_eq!(values[10], 10.0);
        assert_eq!(values[2], 2.0);
    }

    #[test]
    fn indexed_vectors_with_gaps_are_rejected() {
        let raw: RawVector = serde_json::from_str(r#"{"0": 0.5, "2": 0.25}"#).unwrap();
        assert!(raw.into_values().is_err());

        let raw: RawVector = serde_json::from_str(r#"{"x": 0.5}"#).unwrap();
        assert!(raw.into_values().is_err());
    }

    #[test]
    fn identity_names_follow_storage_rules() {
        assert!(validate_identity_name("alice").is_ok());
        assert!(validate_identity_name("bob.smith-2_x").is_ok());
        assert!(validate_identity_name("").is_err());
        assert!(validate_identity_name("../etc").is_err());
        assert!(validate_identity_name(".hidden").is_err());
        assert!(validate_identity_name("a/b").is_err());
        assert!(validate_identity_name(&"a".repeat(MAX_IDENTITY_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn mixed_dimensions_are_invalid_input() {
        let err = validate_embeddings(vec![
            RawVector::from(vec![0.0, 0.0, 0.0]),
            RawVector::from(vec![0.0, 0.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(msg) if msg.contains("mismatch")));
    }

    #[test]
    fn empty_vector_list_is_invalid_input() {
        assert!(matches!(
            validate_embeddings(vec![]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(validate_embeddings(vec![RawVector::List(vec![])]).is_err());
    }
}
