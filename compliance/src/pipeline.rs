//! Process-level entry point: segment intake, document uploads and the
//! alert feed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use regwatch_embed::Embedder;
use regwatch_judge::Judge;
use regwatch_vecstore::VecIndex;

use crate::alerts::AlertBook;
use crate::classifier::{Classifier, KeywordClassifier, classify_document, normalize_text};
use crate::config::ComplianceConfig;
use crate::dedup::Deduplicator;
use crate::documents::DocumentRegistry;
use crate::error::{ComplianceError, ErrorKind, Result};
use crate::gate::Gate;
use crate::ingest::Ingestor;
use crate::kb::KnowledgeBase;
use crate::matcher::Matcher;
use crate::scorer::SeverityScorer;
use crate::store::AlertStore;
use crate::taxonomy::Category;
use crate::types::{
    Alert, AlertAction, AlertDecision, Document, DocumentReceipt, DocumentStatus, DocumentUpload,
    TranscriptSegment,
};

/// Configures a [`Pipeline`].
pub struct PipelineConfig {
    pub config: ComplianceConfig,

    /// Shared by passages and segments. Required.
    pub embedder: Arc<dyn Embedder>,

    /// Vector index holding regulation passages. Required.
    pub index: Arc<dyn VecIndex>,

    /// Durable alert and document state. Required.
    pub store: Arc<dyn AlertStore>,

    /// Semantic reviewer that may shift a tier by one. Optional.
    pub judge: Option<Arc<dyn Judge>>,

    /// Defaults to [`KeywordClassifier`].
    pub classifier: Option<Arc<dyn Classifier>>,
}

/// Summary of [`Pipeline::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub alerts: usize,
    pub documents: usize,
    /// Processed documents queued to rebuild their passages.
    pub reindexing: usize,
}

struct Inner {
    config: ComplianceConfig,
    classifier: Arc<dyn Classifier>,
    kb: Arc<KnowledgeBase>,
    ingestor: Ingestor,
    matcher: Matcher,
    scorer: SeverityScorer,
    dedup: Deduplicator,
    book: Arc<AlertBook>,
    documents: DocumentRegistry,
    speakers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    ingest_slots: Semaphore,
}

/// Safe for concurrent use; clones share state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        let config = cfg.config;
        config.validate()?;

        let classifier: Arc<dyn Classifier> = match cfg.classifier {
            Some(c) => c,
            None => Arc::new(KeywordClassifier::new()?),
        };
        let kb = Arc::new(KnowledgeBase::new(cfg.index));
        let match_gate = Gate::new(config.infra.max_concurrency, &config.infra);
        let ingest_gate = Gate::new(config.ingest.concurrency, &config.infra);
        let book = Arc::new(AlertBook::new(
            Arc::clone(&cfg.store),
            config.alerts.event_buffer,
        ));

        let inner = Inner {
            classifier,
            ingestor: Ingestor::new(
                Arc::clone(&cfg.embedder),
                Arc::clone(&kb),
                ingest_gate,
                config.ingest.clone(),
            ),
            matcher: Matcher::new(
                cfg.embedder,
                Arc::clone(&kb),
                match_gate,
                config.matcher.clone(),
            ),
            scorer: SeverityScorer::new(config.scoring.clone(), cfg.judge),
            dedup: Deduplicator::new(config.alerts.clone(), Arc::clone(&book)),
            documents: DocumentRegistry::new(cfg.store),
            speakers: Mutex::new(HashMap::new()),
            ingest_slots: Semaphore::new(config.ingest.concurrency.max(1)),
            kb,
            book,
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Creates a pipeline and restores its stored state.
    pub async fn start(cfg: PipelineConfig) -> Result<Self> {
        let p = Self::new(cfg)?;
        p.restore()?;
        Ok(p)
    }

    /// Loads alerts and documents from the store. Passages live only in
    /// the index session, so processed documents are ingested again in the
    /// background.
    pub fn restore(&self) -> Result<RestoreReport> {
        let alerts = self.inner.book.restore()?;
        self.inner.dedup.restore(&alerts);
        let documents = self.inner.documents.restore()?;

        let mut reindexing = 0;
        for doc in &documents {
            if doc.status == DocumentStatus::Processed {
                self.inner.documents.update(&doc.document_id, |d| {
                    d.status = DocumentStatus::Pending;
                })?;
                self.spawn_ingestion(doc.document_id.clone());
                reindexing += 1;
            }
        }
        Ok(RestoreReport {
            alerts: alerts.len(),
            documents: documents.len(),
            reindexing,
        })
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.inner.config
    }

    pub fn alerts(&self) -> Arc<AlertBook> {
        Arc::clone(&self.inner.book)
    }

    pub fn knowledge_base(&self) -> Arc<KnowledgeBase> {
        Arc::clone(&self.inner.kb)
    }

    /// Acknowledges or dismisses an alert, attributed to `actor` when given.
    pub fn act(&self, alert_id: &str, action: AlertAction, actor: Option<&str>) -> Result<Alert> {
        let alert = self.inner.book.apply(alert_id, action, actor)?;
        self.inner.dedup.prune();
        Ok(alert)
    }

    /// Speakers holding a lane and speakers holding a dedup window.
    pub(crate) fn tracked_speakers(&self) -> (usize, usize) {
        (self.inner.speakers.lock().len(), self.inner.dedup.speakers())
    }

    /// Runs one segment through matching, scoring and deduplication.
    ///
    /// Segments of one speaker are handled in submission order; different
    /// speakers proceed in parallel. Returns one decision per candidate,
    /// most similar first.
    pub async fn submit_segment(&self, segment: TranscriptSegment) -> Result<Vec<AlertDecision>> {
        validate_segment(&segment)?;

        let lane = {
            let mut speakers = self.inner.speakers.lock();
            Arc::clone(speakers.entry(segment.speaker_id.clone()).or_default())
        };
        let decisions = {
            let _turn = lane.lock().await;
            self.decide(&segment).await
        };
        self.release_lane(&segment.speaker_id, lane);
        decisions
    }

    async fn decide(&self, segment: &TranscriptSegment) -> Result<Vec<AlertDecision>> {
        let candidates = self.inner.matcher.match_segment(segment).await?;
        let mut decisions = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let scored = self.inner.scorer.score(candidate).await;
            decisions.push(self.inner.dedup.absorb(segment, candidate, &scored).await?);
        }
        Ok(decisions)
    }

    /// Removes the speaker's lane once no other segment holds or waits on it.
    fn release_lane(&self, speaker_id: &str, lane: Arc<tokio::sync::Mutex<()>>) {
        let mut speakers = self.inner.speakers.lock();
        drop(lane);
        if speakers
            .get(speaker_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            speakers.remove(speaker_id);
        }
    }

    /// Registers a document and queues it for classification and ingestion.
    /// Size and emptiness are checked before anything is stored.
    pub fn upload_document(&self, upload: DocumentUpload) -> Result<DocumentReceipt> {
        let title = upload.title.trim();
        if title.is_empty() {
            return Err(ComplianceError::Validation("document title is empty".into()));
        }
        let limit = self.inner.config.ingest.max_document_chars;
        let size = upload.raw_text.chars().count();
        if size > limit {
            return Err(ComplianceError::DocumentTooLarge { size, limit });
        }
        if normalize_text(&upload.raw_text).is_empty() {
            return Err(ComplianceError::Validation("document text is empty".into()));
        }

        let now = Utc::now();
        let document = Document {
            document_id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            raw_text: upload.raw_text,
            category: upload.category,
            category_overridden: upload.category.is_some(),
            subcategories: Vec::new(),
            keywords: Vec::new(),
            key_phrases: Vec::new(),
            classification_confidence: 0.0,
            status: DocumentStatus::Pending,
            passage_count: 0,
            failed_passages: 0,
            retryable: false,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let receipt = DocumentReceipt {
            document_id: document.document_id.clone(),
            status: document.status,
        };
        info!(document_id = %receipt.document_id, title, "document uploaded");
        self.inner.documents.insert(document)?;
        self.spawn_ingestion(receipt.document_id.clone());
        Ok(receipt)
    }

    /// Re-runs a failed document.
    pub fn retry_document(&self, document_id: &str) -> Result<DocumentReceipt> {
        let doc = self.inner.documents.requeue(
            document_id,
            "retry",
            |s| s == DocumentStatus::Failed,
            |_| {},
        )?;
        self.spawn_ingestion(doc.document_id.clone());
        Ok(DocumentReceipt {
            document_id: doc.document_id,
            status: doc.status,
        })
    }

    /// Applies a manual category and re-ingests with it.
    pub fn override_category(
        &self,
        document_id: &str,
        category: Category,
    ) -> Result<DocumentReceipt> {
        let doc = self.inner.documents.requeue(
            document_id,
            "override category of",
            |s| s.is_terminal(),
            |d| {
                d.category = Some(category);
                d.category_overridden = true;
                d.subcategories.clear();
                d.keywords.clear();
                d.key_phrases.clear();
                d.classification_confidence = 1.0;
            },
        )?;
        self.spawn_ingestion(doc.document_id.clone());
        Ok(DocumentReceipt {
            document_id: doc.document_id,
            status: doc.status,
        })
    }

    pub fn get_document(&self, document_id: &str) -> Option<Document> {
        self.inner.documents.get(document_id)
    }

    pub fn list_documents(&self) -> Vec<Document> {
        self.inner.documents.list()
    }

    /// Waits for the document's ingestion to finish either way.
    pub async fn wait_document(&self, document_id: &str) -> Result<Document> {
        self.inner.documents.wait(document_id).await
    }

    fn spawn_ingestion(&self, document_id: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.process_document(&document_id).await {
                error!(document_id = %document_id, error = %e, "document bookkeeping failed");
            }
        });
    }
}

impl Inner {
    async fn process_document(&self, document_id: &str) -> Result<()> {
        let _slot = self
            .ingest_slots
            .acquire()
            .await
            .map_err(|_| ComplianceError::TransientInfra {
                op: "ingest".into(),
                attempts: 0,
                message: "ingestion slots closed".into(),
            })?;

        let doc = self.documents.update(document_id, |d| {
            d.status = DocumentStatus::Processing;
        })?;

        let override_category = doc.category.filter(|_| doc.category_overridden);
        let classification = match classify_document(
            self.classifier.as_ref(),
            &doc.raw_text,
            override_category,
            self.config.ingest.max_document_chars,
        ) {
            Ok(c) => c,
            Err(e) => {
                warn!(document_id, error = %e, "classification failed");
                self.fail(document_id, &e, 0)?;
                return Ok(());
            }
        };
        let doc = self.documents.update(document_id, |d| {
            d.category = Some(classification.category);
            d.subcategories = classification.subcategories.clone();
            d.keywords = classification.keywords.iter().cloned().collect();
            d.key_phrases = classification.key_phrases.clone();
            d.classification_confidence = classification.confidence;
        })?;
        info!(
            document_id,
            category = %classification.category,
            confidence = classification.confidence,
            overridden = classification.overridden,
            "document classified"
        );

        match self.ingestor.ingest(&doc).await {
            Ok(result) if result.is_complete() => {
                let live = self.kb.passage_count(document_id);
                self.documents.update(document_id, |d| {
                    d.status = DocumentStatus::Processed;
                    d.passage_count = live;
                    d.failed_passages = 0;
                    d.retryable = false;
                    d.last_error = None;
                })?;
                info!(document_id, passages = live, "document processed");
            }
            Ok(result) => {
                let err = ComplianceError::PartialIngest {
                    document_id: document_id.to_string(),
                    failed: result.failed_passages.len(),
                    total: result.failed_passages.len() + result.passage_count,
                };
                warn!(document_id, error = %err, "document failed");
                self.fail(document_id, &err, result.failed_passages.len())?;
            }
            Err(e) => {
                warn!(document_id, error = %e, "document failed");
                self.fail(document_id, &e, 0)?;
            }
        }
        Ok(())
    }

    fn fail(&self, document_id: &str, err: &ComplianceError, failed_passages: usize) -> Result<()> {
        let retryable = matches!(
            err.kind(),
            ErrorKind::TransientInfra | ErrorKind::Collaborator | ErrorKind::PartialIngestFailure
        );
        let live = self.kb.passage_count(document_id);
        self.documents.update(document_id, |d| {
            d.status = DocumentStatus::Failed;
            d.passage_count = live;
            d.failed_passages = failed_passages;
            d.retryable = retryable;
            d.last_error = Some(err.to_string());
        })?;
        Ok(())
    }
}

fn validate_segment(s: &TranscriptSegment) -> Result<()> {
    let invalid = |msg: String| Err(ComplianceError::Validation(msg));
    if s.speaker_id.trim().is_empty() {
        return invalid("segment speaker_id is empty".into());
    }
    if s.text.trim().is_empty() {
        return invalid(format!("segment from {} has empty text", s.speaker_id));
    }
    if !s.start_time.is_finite() || !s.end_time.is_finite() || s.start_time < 0.0 {
        return invalid(format!(
            "segment from {} has invalid timestamps {}..{}",
            s.speaker_id, s.start_time, s.end_time
        ));
    }
    if s.end_time <= s.start_time {
        return invalid(format!(
            "segment from {} ends at {} before it starts at {}",
            s.speaker_id, s.end_time, s.start_time
        ));
    }
    if !(0.0..=1.0).contains(&s.stt_confidence) {
        return invalid(format!(
            "segment from {} has stt_confidence {} outside [0, 1]",
            s.speaker_id, s.stt_confidence
        ));
    }
    Ok(())
}
