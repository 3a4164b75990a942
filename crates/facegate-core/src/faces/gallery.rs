use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::{ensure_uniform_dimension, Embedding};
use crate::faces::store::{EmbeddingStore, IdentityRecord};

/// One identity and its usable vectors, owned by a single matching request.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub identity: String,
    pub embeddings: Vec<Embedding>,
    dimension: usize,
}

impl GalleryEntry {
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Read-only snapshot of the store, iterated in identity name order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn build<S: EmbeddingStore + ?Sized>(store: &S) -> AppResult<Self> {
        Self::from_records(store.list_all()?)
    }

    pub fn from_records(records: Vec<IdentityRecord>) -> AppResult<Self> {
        let total = records.len();
        let mut entries: Vec<GalleryEntry> =
            records.into_iter().filter_map(usable_entry).collect();
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));

        if entries.is_empty() {
            return Err(AppError::EmptyGallery);
        }

        debug!(
            target: "gallery",
            identities = entries.len(),
            skipped = total - entries.len(),
            "gallery assembled"
        );
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.identity.as_str()).collect()
    }

    /// Fails on the first identity whose vectors cannot be compared with `probe`.
    pub fn check_dimension(&self, probe: &Embedding) -> AppResult<()> {
        match self
            .entries
            .iter()
            .find(|entry| entry.dimension != probe.dimension())
        {
            Some(entry) => Err(AppError::DimensionMismatch {
                identity: entry.identity.clone(),
                expected: entry.dimension,
                found: probe.dimension(),
            }),
            None => Ok(()),
        }
    }
}

fn usable_entry(record: IdentityRecord) -> Option<GalleryEntry> {
    let IdentityRecord {
        name, embeddings, ..
    } = record;

    if embeddings.is_empty() {
        warn!(target: "gallery", identity = %name, "skipping identity with no enrolled vectors");
        return None;
    }

    let converted = embeddings
        .into_iter()
        .map(|entry| Embedding::new(entry.embedding))
        .collect::<AppResult<Vec<_>>>()
        .and_then(|list| ensure_uniform_dimension(&list).map(|dimension| (list, dimension)));

    match converted {
        Ok((embeddings, dimension)) => Some(GalleryEntry {
            identity: name,
            embeddings,
            dimension,
        }),
        Err(err) => {
            warn!(target: "gallery", identity = %name, error = %err, "skipping identity with unusable vectors");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::store::{EnrolledEmbedding, MemoryStore};

    fn record(name: &str, vectors: Vec<Vec<f64>>) -> IdentityRecord {
        IdentityRecord {
            name: name.to_string(),
            embeddings: vectors
                .into_iter()
                .enumerate()
                .map(|(idx, embedding)| EnrolledEmbedding {
                    id: format!("{name}-{idx}"),
                    embedding,
                    created_at: "2025-01-01T00:00:00.000Z".into(),
                })
                .collect(),
            created_at: "2025-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn anomalous_identities_are_skipped() {
        let gallery = Gallery::from_records(vec![
            record("zed", vec![vec![0.0, 1.0]]),
            record("empty", vec![]),
            record("blank", vec![vec![]]),
            record("nan", vec![vec![f64::NAN, 0.0]]),
            record("ragged", vec![vec![0.0, 1.0], vec![0.0]]),
            record("amy", vec![vec![1.0, 0.0], vec![0.5, 0.5]]),
        ])
        .unwrap();

        assert_eq!(gallery.identities(), vec!["amy", "zed"]);
        assert_eq!(gallery.entries()[0].embeddings.len(), 2);
        assert_eq!(gallery.entries()[0].dimension(), 2);
    }

    #[test]
    fn empty_after_filtering_is_empty_gallery() {
        let err = Gallery::from_records(vec![record("empty", vec![])]).unwrap_err();
        assert!(matches!(err, AppError::EmptyGallery));
        assert!(matches!(
            Gallery::build(&MemoryStore::new()),
            Err(AppError::EmptyGallery)
        ));
    }

    #[test]
    fn dimension_check_names_the_offending_identity() {
        let gallery = Gallery::from_records(vec![
            record("alice", vec![vec![0.0, 0.0, 0.0]]),
            record("bob", vec![vec![0.0, 0.0]]),
        ])
        .unwrap();
        let probe = Embedding::new(vec![0.0, 0.0, 0.0]).unwrap();

        match gallery.check_dimension(&probe).unwrap_err() {
            AppError::DimensionMismatch {
                identity,
                expected,
                found,
            } => {
                assert_eq!(identity, "bob");
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
