//! Severity tiering with optional semantic judgment.

use std::sync::Arc;

use tracing::{debug, warn};

use regwatch_judge::Judge;

use crate::config::ScoringConfig;
use crate::types::{MatchCandidate, Scored, Severity};

pub struct SeverityScorer {
    config: ScoringConfig,
    judge: Option<Arc<dyn Judge>>,
}

impl SeverityScorer {
    pub fn new(config: ScoringConfig, judge: Option<Arc<dyn Judge>>) -> Self {
        Self { config, judge }
    }

    pub fn baseline(&self, similarity: f32) -> Severity {
        self.config.bands.tier(similarity)
    }

    /// Never fails: an unavailable, failing or slow judge leaves the
    /// similarity tier in place.
    pub async fn score(&self, candidate: &MatchCandidate) -> Scored {
        let baseline = self.baseline(candidate.similarity);
        let citation = candidate.passage.citation.as_str();
        let fallback = Scored {
            severity: baseline,
            baseline,
            rationale: format!(
                "Matches {citation} with similarity {:.2} ({baseline} band).",
                candidate.similarity
            ),
            judged: false,
        };

        let Some(judge) = &self.judge else {
            return fallback;
        };

        let call = judge.judge(&candidate.segment.text, &candidate.passage.text);
        let judgment = match tokio::time::timeout(self.config.judge_timeout(), call).await {
            Ok(Ok(j)) => j,
            Ok(Err(e)) => {
                warn!(model = judge.model(), citation, error = %e, "judge failed, using similarity tier");
                return fallback;
            }
            Err(_) => {
                warn!(
                    model = judge.model(),
                    citation,
                    timeout_ms = self.config.judge_timeout_ms,
                    "judge timed out, using similarity tier"
                );
                return fallback;
            }
        };

        let limit = self.config.max_judge_shift.min(i8::MAX as u8) as i8;
        let delta = judgment.severity_delta.clamp(-limit, limit);
        let severity = baseline.shift(delta);
        debug!(citation, %baseline, %severity, delta, "judged");

        let note = judgment.rationale.trim();
        let mut rationale = format!(
            "Matches {citation} with similarity {:.2} ({baseline} band)",
            candidate.similarity
        );
        if severity != baseline {
            rationale.push_str(&format!(", adjusted to {severity}"));
        }
        if note.is_empty() {
            rationale.push('.');
        } else {
            rationale.push_str(&format!(": {note}"));
        }

        Scored {
            severity,
            baseline,
            rationale,
            judged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use regwatch_judge::{JudgeError, Judgment};

    use super::*;
    use crate::taxonomy::Category;
    use crate::types::{RegulationPassage, TranscriptSegment};

    struct FixedJudge {
        delta: i8,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Judge for FixedJudge {
        async fn judge(&self, _: &str, _: &str) -> Result<Judgment, JudgeError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(JudgeError::Http { status: 500, body: "boom".into() });
            }
            Ok(Judgment {
                severity_delta: self.delta,
                rationale: "speaker admits to the conduct".into(),
            })
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn candidate(similarity: f32) -> MatchCandidate {
        MatchCandidate {
            segment: Arc::new(TranscriptSegment {
                speaker_id: "S1".into(),
                text: "we have insider information about the merger".into(),
                start_time: 0.0,
                end_time: 3.0,
                detected_language: "en".into(),
                stt_confidence: 0.9,
            }),
            passage: Arc::new(RegulationPassage {
                passage_id: "doc:1:0".into(),
                document_id: "doc".into(),
                text: "trading on material non-public information is prohibited".into(),
                embedding: Vec::new(),
                embedding_version: "v1".into(),
                category: Category::Securities,
                citation: "SEC Rule 10b-5".into(),
                seq: 0,
                generation: 1,
                created_at: Utc::now(),
            }),
            similarity,
        }
    }

    fn scorer(judge: Option<FixedJudge>) -> SeverityScorer {
        SeverityScorer::new(
            ScoringConfig::default(),
            judge.map(|j| Arc::new(j) as Arc<dyn Judge>),
        )
    }

    #[tokio::test]
    async fn test_baseline_cites_passage() {
        let got = scorer(None).score(&candidate(0.92)).await;
        assert_eq!(got.severity, Severity::Critical);
        assert!(!got.judged);
        assert!(got.rationale.contains("SEC Rule 10b-5"));
    }

    #[tokio::test]
    async fn test_judge_shift_is_clamped() {
        let s = scorer(Some(FixedJudge { delta: 3, delay: Duration::ZERO, fail: false }));
        let got = s.score(&candidate(0.80)).await;
        assert_eq!(got.baseline, Severity::Medium);
        assert_eq!(got.severity, Severity::High);
        assert!(got.judged);
        assert!(got.rationale.contains("SEC Rule 10b-5"));
        assert!(got.rationale.contains("admits"));
    }

    #[tokio::test]
    async fn test_judge_downgrade() {
        let s = scorer(Some(FixedJudge { delta: -1, delay: Duration::ZERO, fail: false }));
        let got = s.score(&candidate(0.86)).await;
        assert_eq!(got.severity, Severity::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_judge_falls_back() {
        let s = scorer(Some(FixedJudge { delta: 1, delay: Duration::from_secs(60), fail: false }));
        let got = s.score(&candidate(0.80)).await;
        assert_eq!(got.severity, Severity::Medium);
        assert!(!got.judged);
    }

    #[tokio::test]
    async fn test_failing_judge_falls_back() {
        let s = scorer(Some(FixedJudge { delta: 1, delay: Duration::ZERO, fail: true }));
        let got = s.score(&candidate(0.80)).await;
        assert_eq!(got.severity, Severity::Medium);
        assert!(!got.judged);
    }
}
