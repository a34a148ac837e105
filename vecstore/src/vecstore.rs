use std::collections::BTreeMap;

use crate::error::VecError;
use crate::filter::Filter;

/// Flat string metadata stored next to each vector.
pub type Metadata = BTreeMap<String, String>;

/// Match is a single result from a vector similarity search.
#[derive(Debug, Clone)]
pub struct Match {
    /// Identifier of the matched vector.
    pub id: String,

    /// Cosine similarity in `[-1, 1]`. Higher is closer.
    pub similarity: f32,

    /// Metadata stored with the vector at upsert time.
    pub metadata: Metadata,
}

/// VecIndex is the interface for nearest-neighbor search over dense float32
/// vectors carrying metadata.
///
/// Calls may block (remote backends); async callers should dispatch them on
/// a blocking pool. All implementations must be safe for concurrent use.
pub trait VecIndex: Send + Sync {
    /// Add or replace a vector and its metadata.
    fn upsert(&self, id: &str, vector: &[f32], metadata: Metadata) -> Result<(), VecError>;

    /// Add or replace many vectors. Stops at the first failure.
    fn upsert_batch(&self, items: &[(String, Vec<f32>, Metadata)]) -> Result<(), VecError> {
        for (id, vector, metadata) in items {
            self.upsert(id, vector, metadata.clone())?;
        }
        Ok(())
    }

    /// Remove a vector by ID. No error if ID does not exist.
    fn delete(&self, id: &str) -> Result<(), VecError>;

    /// Return up to `k` vectors accepted by `filter`, ordered by descending
    /// similarity to `query`.
    fn query(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<Match>, VecError>;

    /// Return the number of vectors in the index.
    fn len(&self) -> usize;

    /// Return true if the index contains no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
