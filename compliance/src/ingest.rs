//! Knowledge base ingestion with per-document atomic replacement.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use regwatch_embed::Embedder;

use crate::chunk::chunk_text;
use crate::classifier::normalize_text;
use crate::config::IngestConfig;
use crate::error::{ComplianceError, Result};
use crate::gate::Gate;
use crate::kb::{KnowledgeBase, Promotion, passage_id, passage_metadata};
use crate::types::{Document, IngestResult, PassageFailure, RegulationPassage};

/// Chunks, embeds and indexes documents.
///
/// A new generation is written next to the live one and becomes visible only
/// once every passage is indexed; the previous generation is removed last.
/// When any passage fails, the staged passages are removed and the previous
/// generation stays live.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    kb: Arc<KnowledgeBase>,
    gate: Gate,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        kb: Arc<KnowledgeBase>,
        gate: Gate,
        config: IngestConfig,
    ) -> Self {
        Self {
            embedder,
            kb,
            gate,
            config,
        }
    }

    pub async fn ingest(&self, document: &Document) -> Result<IngestResult> {
        let document_id = document.document_id.as_str();
        let Some(category) = document.category else {
            return Err(ComplianceError::Validation(format!(
                "document {document_id} has no category"
            )));
        };
        let chunks = chunk_text(
            &normalize_text(&document.raw_text),
            self.config.chunk_chars,
            self.config.overlap_chars,
        );
        if chunks.is_empty() {
            return Err(ComplianceError::Validation(format!(
                "document {document_id} has no text"
            )));
        }

        let generation = self.kb.next_generation();
        let version = self.embedder.model_version().to_string();
        let template = RegulationPassage {
            passage_id: String::new(),
            document_id: document_id.to_string(),
            text: String::new(),
            embedding: Vec::new(),
            embedding_version: version,
            category,
            citation: document.title.clone(),
            seq: 0,
            generation,
            created_at: Utc::now(),
        };
        debug!(document_id, generation, passages = chunks.len(), "staging passages");

        let total = chunks.len();
        let outcomes: Vec<_> = stream::iter(chunks.into_iter().enumerate())
            .map(|(seq, text)| {
                let mut passage = template.clone();
                passage.passage_id = passage_id(document_id, generation, seq);
                passage.seq = seq;
                passage.text = text;
                self.stage(passage)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut staged = Vec::with_capacity(total);
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(p) => staged.push(p),
                Err(f) => failed.push(f),
            }
        }
        failed.sort_by_key(|f| f.seq);

        let result = IngestResult {
            document_id: document_id.to_string(),
            passage_count: staged.len(),
            failed_passages: failed,
        };

        if !result.is_complete() {
            warn!(
                document_id,
                generation,
                failed = result.failed_passages.len(),
                total,
                "ingestion incomplete, keeping previous passages"
            );
            let ids: Vec<String> = staged.iter().map(|p| p.passage_id.clone()).collect();
            self.remove(document_id, ids).await;
            return Ok(result);
        }

        let ids: Vec<String> = staged.iter().map(|p| p.passage_id.clone()).collect();
        match self.kb.promote(document_id, generation, staged) {
            Promotion::Promoted(previous) => {
                info!(document_id, generation, passages = total, "passages live");
                if let Some(old) = previous {
                    self.remove(document_id, old.ids()).await;
                }
            }
            Promotion::Stale => {
                debug!(document_id, generation, "newer generation already live");
                self.remove(document_id, ids).await;
            }
        }
        Ok(result)
    }

    async fn stage(
        &self,
        mut passage: RegulationPassage,
    ) -> std::result::Result<Arc<RegulationPassage>, PassageFailure> {
        let seq = passage.seq;
        let fail = move |e: ComplianceError| PassageFailure {
            seq,
            error: e.to_string(),
        };

        let vector = self
            .gate
            .call("embed", || self.embedder.embed(&passage.text))
            .await
            .map_err(fail)?;
        if vector.len() != self.embedder.dimension() {
            return Err(fail(ComplianceError::Consistency(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimension()
            ))));
        }
        passage.embedding = vector;

        let passage = Arc::new(passage);
        let index = self.kb.index();
        let staged = Arc::clone(&passage);
        self.gate
            .blocking("index.upsert", move || {
                index.upsert(
                    &staged.passage_id,
                    &staged.embedding,
                    passage_metadata(&staged),
                )
            })
            .await
            .map_err(fail)?;
        Ok(passage)
    }

    /// Deletes passages from the index. Leftovers are invisible to matching,
    /// so failures are only logged.
    async fn remove(&self, document_id: &str, ids: Vec<String>) {
        for id in ids {
            let index = self.kb.index();
            let target = id.clone();
            if let Err(e) = self
                .gate
                .blocking("index.delete", move || index.delete(&target))
                .await
            {
                warn!(document_id, passage_id = %id, error = %e, "failed to delete passage");
            }
        }
    }
}
