//! Regulation matching over live transcript streams.
//!
//! Documents flow `upload -> classify -> chunk -> embed -> index`; segments
//! flow `match -> score -> deduplicate -> alert`. [`Pipeline`] wires both
//! paths around shared collaborators.

pub mod alerts;
pub mod chunk;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod documents;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod kb;
pub mod matcher;
pub mod pipeline;
pub mod scorer;
pub mod store;
pub mod taxonomy;
pub mod types;

pub use alerts::{AlertBook, AlertEvent, AlertEventKind, AlertFilter, AlertSink, AlertStats};
pub use classifier::{Classifier, KeywordClassifier, classify_document};
pub use config::{
    AlertConfig, ComplianceConfig, InfraConfig, IngestConfig, MatcherConfig, ScoringConfig,
    SeverityBands,
};
pub use dedup::Deduplicator;
pub use error::{ComplianceError, ErrorKind, Result, SinkError, StoreError};
pub use ingest::Ingestor;
pub use kb::KnowledgeBase;
pub use matcher::Matcher;
pub use pipeline::{Pipeline, PipelineConfig, RestoreReport};
pub use scorer::SeverityScorer;
pub use store::{AlertStore, MemoryStore, RedbStore};
pub use taxonomy::Category;
pub use types::{
    Alert, AlertAction, AlertDecision, AlertStatus, Classification, Document, DocumentReceipt,
    DocumentStatus, DocumentUpload, IngestResult, MatchCandidate, PassageFailure,
    RegulationPassage, Scored, Severity, SuppressReason, TimeRange, TranscriptSegment,
};
