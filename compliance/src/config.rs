//! Immutable configuration shared by all pipeline components.
//!
//! Loaded from YAML or JSON; every field has a default so partial files
//! are valid.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, Result};
use crate::taxonomy::Category;
use crate::types::Severity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub matcher: MatcherConfig,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
    pub ingest: IngestConfig,
    pub infra: InfraConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Segments transcribed below this confidence never produce candidates.
    pub stt_confidence_floor: f32,
    /// Minimum cosine similarity for a candidate.
    pub similarity_floor: f32,
    /// Nearest passages fetched per segment.
    pub top_k: usize,
    /// Restrict matching to these categories. Empty means all.
    pub watch_categories: Vec<Category>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            stt_confidence_floor: 0.6,
            similarity_floor: 0.70,
            top_k: 5,
            watch_categories: Vec::new(),
        }
    }
}

/// Lower bounds of the similarity bands. `low` spans
/// `[similarity_floor, medium)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    pub medium: f32,
    pub high: f32,
    pub critical: f32,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            medium: 0.75,
            high: 0.85,
            critical: 0.90,
        }
    }
}

impl SeverityBands {
    pub fn tier(&self, similarity: f32) -> Severity {
        if similarity >= self.critical {
            Severity::Critical
        } else if similarity >= self.high {
            Severity::High
        } else if similarity >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub bands: SeverityBands,
    /// Hard timeout for the semantic judge.
    pub judge_timeout_ms: u64,
    /// Largest tier change the judge may apply.
    pub max_judge_shift: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bands: SeverityBands::default(),
            judge_timeout_ms: 2000,
            max_judge_shift: 1,
        }
    }
}

impl ScoringConfig {
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_millis(self.judge_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Rolling merge window per speaker, in stream seconds.
    pub window_secs: f64,
    /// Candidates scored below this tier are suppressed.
    pub min_severity: Severity,
    /// Maximum alerts created per speaker. 0 means unlimited.
    pub max_alerts_per_speaker: usize,
    /// Capacity of the subscriber broadcast channel.
    pub event_buffer: usize,
    /// Follow-up steps attached to every alert.
    pub actions: ActionPlanConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            window_secs: 300.0,
            min_severity: Severity::Low,
            max_alerts_per_speaker: 0,
            event_buffer: 256,
            actions: ActionPlanConfig::default(),
        }
    }
}

/// Follow-up steps for an alert, by tier and by category. Category steps
/// are appended after the tier's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPlanConfig {
    /// Lowest tier that requires action.
    pub required_from: Severity,
    pub by_severity: BTreeMap<Severity, Vec<String>>,
    pub by_category: BTreeMap<Category, Vec<String>>,
}

impl Default for ActionPlanConfig {
    fn default() -> Self {
        fn steps(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        let serious = [
            "Immediate review of the violation",
            "Consult with legal/compliance team",
            "Document the incident",
            "Assess potential regulatory impact",
        ];
        let critical = [
            "Notify senior management immediately",
            "Consider external legal counsel",
            "Prepare regulatory notification if required",
        ];
        let by_severity = BTreeMap::from([
            (
                Severity::Low,
                steps(&["Monitor for escalation", "Document for future reference"]),
            ),
            (
                Severity::Medium,
                steps(&[
                    "Review the compliance concern",
                    "Monitor for similar issues",
                    "Update relevant policies if needed",
                ]),
            ),
            (Severity::High, steps(&serious)),
            (Severity::Critical, steps(&[&serious[..], &critical[..]].concat())),
        ]);
        let by_category = BTreeMap::from([
            (Category::Ethics, steps(&["Review ethical guidelines and training"])),
            (Category::Financial, steps(&["Review financial controls and procedures"])),
            (
                Category::Environmental,
                steps(&["Review operational procedures and safety protocols"]),
            ),
        ]);
        Self {
            required_from: Severity::Medium,
            by_severity,
            by_category,
        }
    }
}

impl ActionPlanConfig {
    pub fn requires_action(&self, severity: Severity) -> bool {
        severity >= self.required_from
    }

    pub fn steps(&self, severity: Severity, category: Category) -> Vec<String> {
        let tier = self.by_severity.get(&severity).into_iter().flatten();
        let extra = self.by_category.get(&category).into_iter().flatten();
        tier.chain(extra).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum passage length, in characters.
    pub chunk_chars: usize,
    /// Target overlap between adjacent passages, in characters.
    pub overlap_chars: usize,
    /// Documents longer than this are rejected, never truncated.
    pub max_document_chars: usize,
    /// Documents ingested at the same time; also the embedding
    /// concurrency of the ingestion path.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 800,
            overlap_chars: 150,
            max_document_chars: 1_000_000,
            concurrency: 2,
        }
    }
}

/// Limits applied to embedding, index and judge calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraConfig {
    pub max_concurrency: usize,
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            call_timeout_ms: 5000,
            max_retries: 2,
            backoff_base_ms: 200,
        }
    }
}

impl ComplianceConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| ComplianceError::Config(format!("read {}: {e}", path.display())))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let cfg: ComplianceConfig = match ext {
            "json" => serde_json::from_slice(&data)
                .map_err(|e| ComplianceError::Config(e.to_string()))?,
            "yaml" | "yml" => serde_yaml::from_slice(&data)
                .map_err(|e| ComplianceError::Config(e.to_string()))?,
            _ => {
                return Err(ComplianceError::Config(format!(
                    "unsupported config extension {ext:?}"
                )));
            }
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.matcher;
        let b = &self.scoring.bands;
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ComplianceError::Config(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        unit("matcher.stt_confidence_floor", m.stt_confidence_floor)?;
        unit("matcher.similarity_floor", m.similarity_floor)?;
        unit("scoring.bands.critical", b.critical)?;

        if !(m.similarity_floor <= b.medium && b.medium < b.high && b.high < b.critical) {
            return Err(ComplianceError::Config(format!(
                "bands must satisfy similarity_floor <= medium < high < critical, got {} / {} / {} / {}",
                m.similarity_floor, b.medium, b.high, b.critical
            )));
        }
        if m.top_k == 0 {
            return Err(ComplianceError::Config("matcher.top_k must be positive".into()));
        }
        if self.alerts.window_secs < 0.0 {
            return Err(ComplianceError::Config("alerts.window_secs must not be negative".into()));
        }
        if self.alerts.event_buffer == 0 {
            return Err(ComplianceError::Config("alerts.event_buffer must be positive".into()));
        }

        let i = &self.ingest;
        if i.chunk_chars == 0 {
            return Err(ComplianceError::Config("ingest.chunk_chars must be positive".into()));
        }
        if i.overlap_chars >= i.chunk_chars {
            return Err(ComplianceError::Config(format!(
                "ingest.overlap_chars ({}) must be smaller than chunk_chars ({})",
                i.overlap_chars, i.chunk_chars
            )));
        }
        if i.concurrency == 0 || self.infra.max_concurrency == 0 {
            return Err(ComplianceError::Config("concurrency limits must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        ComplianceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_bands() {
        let b = SeverityBands::default();
        assert_eq!(b.tier(0.72), Severity::Low);
        assert_eq!(b.tier(0.80), Severity::Medium);
        assert_eq!(b.tier(0.86), Severity::High);
        assert_eq!(b.tier(0.92), Severity::Critical);
        assert_eq!(b.tier(1.0), Severity::Critical);
    }

    #[test]
    fn test_default_action_plan() {
        let plan = ActionPlanConfig::default();
        assert!(!plan.requires_action(Severity::Low));
        assert!(plan.requires_action(Severity::Medium));

        let low = plan.steps(Severity::Low, Category::Securities);
        assert_eq!(low, vec!["Monitor for escalation", "Document for future reference"]);

        let critical = plan.steps(Severity::Critical, Category::Financial);
        assert_eq!(critical.len(), 8);
        assert_eq!(critical[0], "Immediate review of the violation");
        assert_eq!(critical[4], "Notify senior management immediately");
        assert_eq!(critical[7], "Review financial controls and procedures");
    }

    #[test]
    fn test_action_plan_from_yaml() {
        let yaml = r#"
alerts:
  actions:
    required_from: high
    by_severity:
      high: [Escalate to the desk head]
    by_category:
      securities: [Freeze the trading book]
"#;
        let cfg: ComplianceConfig = serde_yaml::from_str(yaml).unwrap();
        let plan = &cfg.alerts.actions;
        assert!(!plan.requires_action(Severity::Medium));
        assert!(plan.requires_action(Severity::Critical));
        assert_eq!(
            plan.steps(Severity::High, Category::Securities),
            vec!["Escalate to the desk head", "Freeze the trading book"]
        );
        assert!(plan.steps(Severity::Low, Category::Other).is_empty());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
matcher:
  similarity_floor: 0.8
  watch_categories: [securities, financial]
scoring:
  bands:
    medium: 0.85
    high: 0.9
    critical: 0.95
alerts:
  min_severity: high
"#;
        let cfg: ComplianceConfig = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.matcher.similarity_floor, 0.8);
        assert_eq!(cfg.matcher.top_k, 5);
        assert_eq!(
            cfg.matcher.watch_categories,
            vec![Category::Securities, Category::Financial]
        );
        assert_eq!(cfg.alerts.min_severity, Severity::High);
        assert_eq!(cfg.alerts.window_secs, 300.0);
    }

    #[test]
    fn test_rejects_unordered_bands() {
        let mut cfg = ComplianceConfig::default();
        cfg.scoring.bands.high = 0.95;
        assert!(cfg.validate().is_err());

        let mut cfg = ComplianceConfig::default();
        cfg.matcher.similarity_floor = 0.8;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_overlap() {
        let mut cfg = ComplianceConfig::default();
        cfg.ingest.overlap_chars = cfg.ingest.chunk_chars;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regwatch.json");
        std::fs::write(&path, r#"{"alerts": {"window_secs": 60}}"#).unwrap();
        let cfg = ComplianceConfig::load(&path).unwrap();
        assert_eq!(cfg.alerts.window_secs, 60.0);

        let bad = dir.path().join("regwatch.toml");
        std::fs::write(&bad, "").unwrap();
        assert!(ComplianceConfig::load(&bad).is_err());
    }
}
