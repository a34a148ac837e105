//! Segment to regulation passage matching.

use std::sync::Arc;

use tracing::{debug, warn};

use regwatch_embed::Embedder;
use regwatch_vecstore::Filter;

use crate::config::MatcherConfig;
use crate::error::Result;
use crate::gate::Gate;
use crate::kb::{KnowledgeBase, META_CATEGORY, META_DOCUMENT_ID, META_EMBEDDING_VERSION, Resolution};
use crate::types::{MatchCandidate, TranscriptSegment};

pub struct Matcher {
    embedder: Arc<dyn Embedder>,
    kb: Arc<KnowledgeBase>,
    gate: Gate,
    config: MatcherConfig,
    filter: Filter,
}

impl Matcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        kb: Arc<KnowledgeBase>,
        gate: Gate,
        config: MatcherConfig,
    ) -> Self {
        let filter = Filter::new().any_of(
            META_CATEGORY,
            config.watch_categories.iter().map(|c| c.as_str()),
        );
        Self {
            embedder,
            kb,
            gate,
            config,
            filter,
        }
    }

    /// Returns candidates at or above the similarity floor, most similar
    /// first. Hits from another embedding space or outside the live passage
    /// sets are dropped.
    pub async fn match_segment(&self, segment: &TranscriptSegment) -> Result<Vec<MatchCandidate>> {
        let speaker_id = segment.speaker_id.as_str();
        if segment.stt_confidence < self.config.stt_confidence_floor {
            debug!(
                speaker_id,
                confidence = segment.stt_confidence,
                "below transcription confidence floor, skipping"
            );
            return Ok(Vec::new());
        }
        if segment.text.trim().is_empty() || self.kb.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .gate
            .call("embed", || self.embedder.embed(&segment.text))
            .await?;

        let index = self.kb.index();
        let filter = self.filter.clone();
        // Entries outside the live sets can each take one slot.
        let k = self.config.top_k + self.kb.hidden_count();
        let hits = self
            .gate
            .blocking("index.query", move || index.query(&vector, k, &filter))
            .await?;

        let version = self.embedder.model_version();
        let segment = Arc::new(segment.clone());
        let mut candidates = Vec::new();
        for hit in hits {
            let hit_version = hit
                .metadata
                .get(META_EMBEDDING_VERSION)
                .map(String::as_str)
                .unwrap_or("");
            if hit_version != version {
                warn!(
                    speaker_id,
                    passage_id = %hit.id,
                    passage_version = hit_version,
                    segment_version = version,
                    "embedding version mismatch, dropping match"
                );
                continue;
            }
            let document_id = hit
                .metadata
                .get(META_DOCUMENT_ID)
                .map(String::as_str)
                .unwrap_or("");
            let passage = match self.kb.resolve(document_id, &hit.id) {
                Resolution::Live(p) => p,
                Resolution::NotLive => continue,
                Resolution::UnknownDocument => {
                    warn!(
                        speaker_id,
                        passage_id = %hit.id,
                        document_id,
                        "index hit references an unknown document, dropping match"
                    );
                    continue;
                }
            };
            if hit.similarity < self.config.similarity_floor {
                continue;
            }
            candidates.push(MatchCandidate {
                segment: Arc::clone(&segment),
                passage,
                similarity: hit.similarity,
            });
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.passage.passage_id.cmp(&b.passage.passage_id))
        });
        candidates.truncate(self.config.top_k);
        if !candidates.is_empty() {
            debug!(
                speaker_id,
                candidates = candidates.len(),
                top = candidates[0].similarity,
                "segment matched"
            );
        }
        Ok(candidates)
    }
}
