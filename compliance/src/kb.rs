//! Live passage sets over a shared vector index.
//!
//! The index may hold passages of several ingestion generations of one
//! document at a time (staged, live, or awaiting deletion). Only the
//! generation recorded here is visible to matching.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use regwatch_vecstore::{Metadata, VecIndex};

use crate::types::RegulationPassage;

pub const META_DOCUMENT_ID: &str = "document_id";
pub const META_CATEGORY: &str = "category";
pub const META_CITATION: &str = "citation";
pub const META_EMBEDDING_VERSION: &str = "embedding_version";
pub const META_GENERATION: &str = "generation";
pub const META_SEQ: &str = "seq";

/// Index id of a passage.
pub fn passage_id(document_id: &str, generation: u64, seq: usize) -> String {
    format!("{document_id}:{generation}:{seq}")
}

/// Index metadata for a passage.
pub fn passage_metadata(p: &RegulationPassage) -> Metadata {
    let mut m = Metadata::new();
    m.insert(META_DOCUMENT_ID.into(), p.document_id.clone());
    m.insert(META_CATEGORY.into(), p.category.as_str().into());
    m.insert(META_CITATION.into(), p.citation.clone());
    m.insert(META_EMBEDDING_VERSION.into(), p.embedding_version.clone());
    m.insert(META_GENERATION.into(), p.generation.to_string());
    m.insert(META_SEQ.into(), p.seq.to_string());
    m
}

/// The visible passages of one document.
#[derive(Debug, Clone)]
pub struct LiveSet {
    pub generation: u64,
    pub passages: HashMap<String, Arc<RegulationPassage>>,
}

impl LiveSet {
    pub fn ids(&self) -> Vec<String> {
        self.passages.keys().cloned().collect()
    }
}

/// Result of looking up a passage id returned by the index.
#[derive(Debug, Clone)]
pub enum Resolution {
    Live(Arc<RegulationPassage>),
    /// Known document, but the passage is staged or superseded.
    NotLive,
    /// No live set for the document at all.
    UnknownDocument,
}

/// Result of promoting a staged generation.
#[derive(Debug)]
pub enum Promotion {
    /// The staged set is live; the returned set (if any) must be removed
    /// from the index.
    Promoted(Option<LiveSet>),
    /// A newer generation is already live; the staged set must be removed.
    Stale,
}

pub struct KnowledgeBase {
    index: Arc<dyn VecIndex>,
    live: RwLock<HashMap<String, LiveSet>>,
    generation: AtomicU64,
}

impl KnowledgeBase {
    pub fn new(index: Arc<dyn VecIndex>) -> Self {
        Self {
            index,
            live: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(1),
        }
    }

    pub fn index(&self) -> Arc<dyn VecIndex> {
        Arc::clone(&self.index)
    }

    /// Reserves a generation number for a new ingestion attempt.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Makes `passages` the live set of `document_id` in one step.
    pub fn promote(
        &self,
        document_id: &str,
        generation: u64,
        passages: Vec<Arc<RegulationPassage>>,
    ) -> Promotion {
        let set = LiveSet {
            generation,
            passages: passages
                .into_iter()
                .map(|p| (p.passage_id.clone(), p))
                .collect(),
        };
        let mut live = self.live.write();
        if live
            .get(document_id)
            .is_some_and(|cur| cur.generation > generation)
        {
            return Promotion::Stale;
        }
        Promotion::Promoted(live.insert(document_id.to_string(), set))
    }

    pub fn resolve(&self, document_id: &str, passage_id: &str) -> Resolution {
        let live = self.live.read();
        match live.get(document_id) {
            None => Resolution::UnknownDocument,
            Some(set) => match set.passages.get(passage_id) {
                Some(p) => Resolution::Live(Arc::clone(p)),
                None => Resolution::NotLive,
            },
        }
    }

    pub fn passage_count(&self, document_id: &str) -> usize {
        self.live
            .read()
            .get(document_id)
            .map_or(0, |s| s.passages.len())
    }

    pub fn passages(&self, document_id: &str) -> Vec<Arc<RegulationPassage>> {
        let mut out: Vec<_> = self
            .live
            .read()
            .get(document_id)
            .map(|s| s.passages.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|p| p.seq);
        out
    }

    /// Index entries outside every live set: staged generations and
    /// superseded ones awaiting deletion.
    pub fn hidden_count(&self) -> usize {
        let live: usize = self.live.read().values().map(|s| s.passages.len()).sum();
        self.index.len().saturating_sub(live)
    }

    /// True when no document has live passages.
    pub fn is_empty(&self) -> bool {
        self.live.read().values().all(|s| s.passages.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use regwatch_vecstore::MemoryIndex;

    use super::*;
    use crate::taxonomy::Category;

    fn passage(doc: &str, generation: u64, seq: usize) -> Arc<RegulationPassage> {
        Arc::new(RegulationPassage {
            passage_id: passage_id(doc, generation, seq),
            document_id: doc.into(),
            text: format!("passage {seq}"),
            embedding: Vec::new(),
            embedding_version: "v1".into(),
            category: Category::Financial,
            citation: "Title".into(),
            seq,
            generation,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_promote_swaps_generations() {
        let kb = KnowledgeBase::new(Arc::new(MemoryIndex::new()));
        assert!(kb.is_empty());
        let g1 = kb.next_generation();
        let g2 = kb.next_generation();
        assert!(g2 > g1);

        match kb.promote("d", g1, vec![passage("d", g1, 0), passage("d", g1, 1)]) {
            Promotion::Promoted(None) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(kb.passage_count("d"), 2);
        assert!(matches!(kb.resolve("d", "d:1:0"), Resolution::Live(_)));

        match kb.promote("d", g2, vec![passage("d", g2, 0)]) {
            Promotion::Promoted(Some(old)) => assert_eq!(old.generation, g1),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(kb.passage_count("d"), 1);
        assert!(matches!(kb.resolve("d", &passage_id("d", g1, 0)), Resolution::NotLive));
        assert_eq!(kb.hidden_count(), 0);
        assert!(matches!(kb.resolve("x", "x:1:0"), Resolution::UnknownDocument));

        // An older attempt finishing late never replaces a newer one.
        assert!(matches!(kb.promote("d", g1, vec![]), Promotion::Stale));
    }

    #[test]
    fn test_metadata_keys() {
        let m = passage_metadata(&passage("doc-9", 4, 2));
        assert_eq!(m[META_DOCUMENT_ID], "doc-9");
        assert_eq!(m[META_CATEGORY], "financial");
        assert_eq!(m[META_GENERATION], "4");
        assert_eq!(m[META_SEQ], "2");
    }
}
