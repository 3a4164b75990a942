use serde::Serialize;

use crate::errors::AppResult;
use crate::faces::store::EmbeddingStore;

/// What an operator may see about an identity. Vectors stay in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub vector_count: usize,
    pub dimension: Option<usize>,
    pub created_at: String,
}

pub fn list_identities<S: EmbeddingStore + ?Sized>(store: &S) -> AppResult<Vec<IdentitySummary>> {
    Ok(store
        .list_all()?
        .into_iter()
        .map(|record| IdentitySummary {
            vector_count: record.vector_count(),
            dimension: record.dimension(),
            name: record.name,
            created_at: record.created_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::embedding::RawVector;
    use crate::faces::store::MemoryStore;

    #[test]
    fn summaries_omit_vectors() {
        let store = MemoryStore::new();
        store
            .enroll(
                "bob",
                vec![
                    RawVector::from(vec![0.123456789, 0.5]),
                    RawVector::from(vec![0.4, 0.6]),
                ],
            )
            .unwrap();
        store
            .enroll("alice", vec![RawVector::from(vec![0.1, 0.2])])
            .unwrap();

        let listed = list_identities(&store).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "alice");
        assert_eq!(listed[1].vector_count, 2);
        assert_eq!(listed[1].dimension, Some(2));

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("0.123456789"));
        assert!(!json.contains("embedding"));
    }
}
