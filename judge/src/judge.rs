use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// Verdict returned by a [`Judge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    /// Suggested tier shift: -1 downgrade, 0 keep, +1 upgrade.
    pub severity_delta: i8,

    /// One-sentence explanation shown next to the alert.
    #[serde(default)]
    pub rationale: String,
}

impl Judgment {
    pub fn keep(rationale: impl Into<String>) -> Self {
        Self {
            severity_delta: 0,
            rationale: rationale.into(),
        }
    }
}

/// Contextual reviewer for a transcript/passage pair.
///
/// Callers always wrap `judge` in a hard timeout; implementations need not
/// enforce one themselves.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, segment_text: &str, passage_text: &str) -> Result<Judgment, JudgeError>;
    fn model(&self) -> &str;
}
