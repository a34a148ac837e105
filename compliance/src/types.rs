use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomy::Category;

/// One diarized, transcribed utterance. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Stable speaker label assigned by diarization.
    pub speaker_id: String,

    /// Post-STT text, possibly mixing languages.
    pub text: String,

    /// Stream-relative start, in seconds.
    pub start_time: f64,

    /// Stream-relative end, in seconds. Must be greater than `start_time`.
    pub end_time: f64,

    /// Language tag, or a mixed-language marker.
    #[serde(default)]
    pub detected_language: String,

    /// Transcription confidence in `[0, 1]`.
    pub stt_confidence: f32,
}

/// A chunk of an ingested regulation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationPassage {
    pub passage_id: String,
    pub document_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Model version of the embedder that produced `embedding`.
    pub embedding_version: String,
    pub category: Category,
    pub citation: String,
    /// Position of the passage inside its document.
    pub seq: usize,
    /// Ingestion generation this passage belongs to.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An uploaded regulatory artifact and its ingestion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub raw_text: String,
    /// Assigned category; `None` until classified unless overridden.
    #[serde(default)]
    pub category: Option<Category>,
    /// True when `category` was supplied by a person rather than classified.
    #[serde(default)]
    pub category_overridden: bool,
    #[serde(default)]
    pub subcategories: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Obligation sentences picked out by the classifier.
    #[serde(default)]
    pub key_phrases: Vec<String>,
    /// Share of keyword hits behind `category`; 1.0 when overridden.
    #[serde(default)]
    pub classification_confidence: f32,
    pub status: DocumentStatus,
    /// Passages live in the index for this document.
    pub passage_count: usize,
    /// Passages that failed in the latest ingestion attempt.
    #[serde(default)]
    pub failed_passages: usize,
    /// Failed documents may be retried; never retried automatically.
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input of a document upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub title: String,
    pub raw_text: String,
    /// Manual category; skips classification when set.
    #[serde(default)]
    pub category: Option<Category>,
}

/// Synchronous answer to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReceipt {
    pub document_id: String,
    pub status: DocumentStatus,
}

/// Output of the document classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub subcategories: Vec<String>,
    pub keywords: BTreeSet<String>,
    /// Obligation sentences representative of the document.
    #[serde(default)]
    pub key_phrases: Vec<String>,
    /// Share of keyword hits belonging to `category`, in `[0, 1]`.
    pub confidence: f32,
    pub overridden: bool,
}

/// A passage that failed during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageFailure {
    pub seq: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    pub document_id: String,
    /// Passages embedded and indexed by this attempt. They are withdrawn
    /// again when any passage failed.
    pub passage_count: usize,
    pub failed_passages: Vec<PassageFailure>,
}

impl IngestResult {
    pub fn is_complete(&self) -> bool {
        self.failed_passages.is_empty()
    }
}

/// A segment/passage pair that cleared the similarity floor.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub segment: Arc<TranscriptSegment>,
    pub passage: Arc<RegulationPassage>,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Move `delta` tiers up or down, saturating at the ends.
    pub fn shift(self, delta: i8) -> Severity {
        let idx = Severity::ALL.iter().position(|s| *s == self).unwrap_or(0) as i64;
        let target = (idx + delta as i64).clamp(0, Severity::ALL.len() as i64 - 1);
        Severity::ALL[target as usize]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|v| v.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown severity {s:?}"))
    }
}

/// Scorer output for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub severity: Severity,
    /// Tier from the similarity bands alone.
    pub baseline: Severity,
    pub rationale: String,
    /// True when the semantic judge adjusted or confirmed the tier.
    pub judged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Dismissed,
    Merged,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Dismissed => "dismissed",
            AlertStatus::Merged => "merged",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AlertStatus::Open,
            AlertStatus::Acknowledged,
            AlertStatus::Dismissed,
            AlertStatus::Merged,
        ]
        .into_iter()
        .find(|v| v.to_string().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown alert status {s:?}"))
    }
}

/// Stream-relative span covered by an alert, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// The user-facing unit. Never deleted, only status-transitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub speaker_id: String,
    pub timestamp_range: TimeRange,
    pub transcript_excerpt: String,
    /// Citation snapshot taken at match time.
    pub matched_citation: String,
    pub matched_document_id: String,
    pub matched_passage_id: String,
    /// Passage text snapshot taken at match time.
    pub matched_passage_text: String,
    pub category: Category,
    pub embedding_version: String,
    /// Highest similarity among contributing segments.
    pub similarity: f32,
    pub severity: Severity,
    pub rationale: String,
    #[serde(default)]
    pub judged: bool,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Number of segments that contributed.
    pub occurrence_count: u32,
    /// Set when status is `merged`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
    /// True when the tier calls for follow-up.
    #[serde(default)]
    pub action_required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// External alert actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Acknowledge,
    Dismiss,
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertAction::Acknowledge => f.write_str("acknowledge"),
            AlertAction::Dismiss => f.write_str("dismiss"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Tier below the configured minimum-severity-to-alert.
    BelowMinimumSeverity,
    /// Speaker already reached the per-speaker alert cap.
    SpeakerCap,
}

/// Outcome of feeding one scored candidate to the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    NewAlert(String),
    MergedInto(String),
    Suppressed(SuppressReason),
}

impl AlertDecision {
    pub fn alert_id(&self) -> Option<&str> {
        match self {
            AlertDecision::NewAlert(id) | AlertDecision::MergedInto(id) => Some(id),
            AlertDecision::Suppressed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order_and_shift() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Medium.shift(1), Severity::High);
        assert_eq!(Severity::Medium.shift(-1), Severity::Low);
        assert_eq!(Severity::Critical.shift(1), Severity::Critical);
        assert_eq!(Severity::Low.shift(-3), Severity::Low);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("dismissed".parse::<AlertStatus>(), Ok(AlertStatus::Dismissed));
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_segment_language_defaults() {
        let seg: TranscriptSegment = serde_json::from_str(
            r#"{"speaker_id":"S1","text":"hi","start_time":0.0,"end_time":1.0,"stt_confidence":0.9}"#,
        )
        .unwrap();
        assert_eq!(seg.detected_language, "");
    }
}
