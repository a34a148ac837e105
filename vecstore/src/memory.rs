use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cosine::cosine_similarity;
use crate::error::VecError;
use crate::filter::Filter;
use crate::vecstore::{Match, Metadata, VecIndex};

struct Entry {
    vector: Vec<f32>,
    metadata: Metadata,
}

/// MemoryIndex is an in-memory VecIndex using brute-force cosine similarity.
/// Intended for testing and small knowledge bases (a few thousand passages).
///
/// When created with [`MemoryIndex::with_dimension`], vectors of any other
/// length are rejected on upsert and query.
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, Entry>>,
    dim: Option<usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dim: None,
        }
    }

    pub fn with_dimension(dim: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dim: Some(dim),
        }
    }

    /// IDs currently stored, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn check_dim(&self, len: usize) -> Result<(), VecError> {
        match self.dim {
            Some(want) if want != len => Err(VecError::DimensionMismatch { got: len, want }),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VecIndex for MemoryIndex {
    fn upsert(&self, id: &str, vector: &[f32], metadata: Metadata) -> Result<(), VecError> {
        if vector.is_empty() {
            return Err(VecError::EmptyVector(id.to_string()));
        }
        self.check_dim(vector.len())?;
        self.entries.write().insert(
            id.to_string(),
            Entry {
                vector: vector.to_vec(),
                metadata,
            },
        );
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), VecError> {
        self.entries.write().remove(id);
        Ok(())
    }

    fn query(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<Match>, VecError> {
        self.check_dim(query.len())?;
        let entries = self.entries.read();
        if entries.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<Match> = entries
            .iter()
            .filter(|(_, e)| filter.accepts(&e.metadata))
            .map(|(id, e)| Match {
                id: id.clone(),
                similarity: cosine_similarity(query, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(category: &str) -> Metadata {
        Metadata::from([("category".to_string(), category.to_string())])
    }

    #[test]
    fn test_upsert_and_query() {
        let idx = MemoryIndex::new();
        idx.upsert("a", &[1.0, 0.0, 0.0, 0.0], meta("x")).unwrap();
        idx.upsert("b", &[0.0, 1.0, 0.0, 0.0], meta("x")).unwrap();
        idx.upsert("c", &[0.9, 0.1, 0.0, 0.0], meta("y")).unwrap();

        let matches = idx.query(&[1.0, 0.0, 0.0, 0.0], 2, &Filter::new()).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[1].id, "c");
        assert!(matches[0].similarity > matches[1].similarity);
        assert_eq!(matches[1].metadata["category"], "y");
    }

    #[test]
    fn test_query_filter() {
        let idx = MemoryIndex::new();
        idx.upsert("a", &[1.0, 0.0], meta("x")).unwrap();
        idx.upsert("b", &[0.9, 0.1], meta("y")).unwrap();

        let matches = idx
            .query(&[1.0, 0.0], 5, &Filter::new().eq("category", "y"))
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
    }

    #[test]
    fn test_upsert_replaces() {
        let idx = MemoryIndex::new();
        idx.upsert("a", &[1.0, 0.0], meta("x")).unwrap();
        idx.upsert("a", &[0.0, 1.0], meta("z")).unwrap();
        assert_eq!(idx.len(), 1);
        let m = idx.query(&[0.0, 1.0], 1, &Filter::new()).unwrap();
        assert!((m[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(m[0].metadata["category"], "z");
    }

    #[test]
    fn test_upsert_batch() {
        let idx = MemoryIndex::new();
        idx.upsert_batch(&[
            ("a".into(), vec![1.0, 0.0], meta("x")),
            ("b".into(), vec![0.0, 1.0], meta("x")),
        ])
        .unwrap();
        assert_eq!(idx.ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_delete() {
        let idx = MemoryIndex::new();
        idx.upsert("a", &[1.0, 0.0], meta("x")).unwrap();
        idx.delete("a").unwrap();
        assert!(idx.is_empty());
        idx.delete("nonexistent").unwrap();
    }

    #[test]
    fn test_dimension_enforced() {
        let idx = MemoryIndex::with_dimension(3);
        assert!(matches!(
            idx.upsert("a", &[1.0, 0.0], meta("x")),
            Err(VecError::DimensionMismatch { got: 2, want: 3 })
        ));
        assert!(idx.query(&[1.0], 1, &Filter::new()).is_err());
        assert!(matches!(
            idx.upsert("a", &[], meta("x")),
            Err(VecError::EmptyVector(_))
        ));
    }

    #[test]
    fn test_query_empty() {
        let idx = MemoryIndex::new();
        assert!(idx.query(&[1.0, 0.0, 0.0], 5, &Filter::new()).unwrap().is_empty());
    }
}
