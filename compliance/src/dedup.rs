//! Alert deduplication and suppression.
//!
//! Each speaker has a window of open alerts guarded by its own async mutex,
//! so two candidates for the same speaker can never race to open duplicate
//! alerts. Windows are measured in stream time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::alerts::{AlertBook, AlertEventKind};
use crate::config::AlertConfig;
use crate::error::Result;
use crate::types::{
    Alert, AlertDecision, AlertStatus, MatchCandidate, Scored, Severity, SuppressReason,
    TimeRange, TranscriptSegment,
};

#[derive(Debug, Default)]
struct SpeakerWindow {
    /// Ids of alerts that were open when last seen, oldest first.
    open: Vec<String>,
    /// Alerts ever created for the speaker.
    created: usize,
}

pub struct Deduplicator {
    config: AlertConfig,
    book: Arc<AlertBook>,
    windows: Mutex<HashMap<String, Arc<tokio::sync::Mutex<SpeakerWindow>>>>,
}

impl Deduplicator {
    pub fn new(config: AlertConfig, book: Arc<AlertBook>) -> Self {
        Self {
            config,
            book,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuilds speaker windows from restored alerts.
    pub fn restore(&self, alerts: &[Alert]) {
        let mut sorted: Vec<&Alert> = alerts.iter().collect();
        sorted.sort_by_key(|a| a.created_at);

        let mut windows: HashMap<String, SpeakerWindow> = HashMap::new();
        for a in sorted {
            let w = windows.entry(a.speaker_id.clone()).or_default();
            w.created += 1;
            if a.status == AlertStatus::Open {
                w.open.push(a.alert_id.clone());
            }
        }
        let mut map = self.windows.lock();
        map.clear();
        for (speaker, w) in windows {
            map.insert(speaker, Arc::new(tokio::sync::Mutex::new(w)));
        }
    }

    fn window(&self, speaker_id: &str) -> Arc<tokio::sync::Mutex<SpeakerWindow>> {
        Arc::clone(self.windows.lock().entry(speaker_id.to_string()).or_default())
    }

    /// Drops idle speaker windows whose alerts are all closed. Windows are
    /// kept while a per-speaker cap needs their created count. Returns the
    /// number of windows dropped.
    pub fn prune(&self) -> usize {
        if self.config.max_alerts_per_speaker > 0 {
            return 0;
        }
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let Ok(mut w) = window.try_lock() else {
                return true;
            };
            w.open
                .retain(|id| self.book.get(id).is_some_and(|a| a.status == AlertStatus::Open));
            !w.open.is_empty()
        });
        let dropped = before - windows.len();
        if dropped > 0 {
            debug!(dropped, remaining = windows.len(), "pruned speaker windows");
        }
        dropped
    }

    /// Number of speakers with a tracked window.
    pub fn speakers(&self) -> usize {
        self.windows.lock().len()
    }

    pub async fn absorb(
        &self,
        segment: &TranscriptSegment,
        candidate: &MatchCandidate,
        scored: &Scored,
    ) -> Result<AlertDecision> {
        let speaker_id = segment.speaker_id.as_str();
        if scored.severity < self.config.min_severity {
            debug!(
                speaker_id,
                severity = %scored.severity,
                min = %self.config.min_severity,
                "below minimum severity, suppressed"
            );
            return Ok(AlertDecision::Suppressed(SuppressReason::BelowMinimumSeverity));
        }

        let window = self.window(speaker_id);
        let mut window = window.lock().await;

        let targets = self.targets(&mut window, segment, candidate);
        if let Some((target, absorbed)) = targets.split_last() {
            if let Some(id) = self.merge(target, absorbed, segment, candidate, scored)? {
                window.open.retain(|o| !absorbed.contains(o));
                return Ok(AlertDecision::MergedInto(id));
            }
        }

        let cap = self.config.max_alerts_per_speaker;
        if cap > 0 && window.created >= cap {
            debug!(speaker_id, cap, "speaker alert cap reached, suppressed");
            return Ok(AlertDecision::Suppressed(SuppressReason::SpeakerCap));
        }

        let mut alert = new_alert(segment, candidate, scored);
        self.plan_actions(&mut alert);
        let alert_id = alert.alert_id.clone();
        info!(
            speaker_id,
            alert_id = %alert_id,
            document_id = %alert.matched_document_id,
            severity = %alert.severity,
            similarity = alert.similarity,
            "alert created"
        );
        self.book.create(alert)?;
        window.open.push(alert_id.clone());
        window.created += 1;
        Ok(AlertDecision::NewAlert(alert_id))
    }

    /// Open alerts in the window matching the candidate's document and
    /// category, oldest first. The window spans `window_secs` on either side
    /// of an alert's range. Prunes ids that closed or aged out.
    fn targets(
        &self,
        window: &mut SpeakerWindow,
        segment: &TranscriptSegment,
        candidate: &MatchCandidate,
    ) -> Vec<String> {
        let mut targets = Vec::new();
        let mut keep = Vec::with_capacity(window.open.len());
        for id in window.open.drain(..) {
            let Some(a) = self.book.get(&id) else {
                continue;
            };
            if a.status != AlertStatus::Open {
                continue;
            }
            let range = &a.timestamp_range;
            if segment.start_time - range.end > self.config.window_secs {
                continue;
            }
            // A segment far before the alert, e.g. a feed whose clock
            // restarted, stays in its own alert but does not age this one out.
            if range.start - segment.end_time > self.config.window_secs {
                keep.push(id);
                continue;
            }
            if a.matched_document_id == candidate.passage.document_id
                && a.category == candidate.passage.category
            {
                targets.push(id.clone());
            }
            keep.push(id);
        }
        window.open = keep;
        targets
    }

    /// Folds `absorbed` into `target`, then the candidate. Returns `None`
    /// when the target stopped being open in the meantime.
    fn merge(
        &self,
        target: &str,
        absorbed: &[String],
        segment: &TranscriptSegment,
        candidate: &MatchCandidate,
        scored: &Scored,
    ) -> Result<Option<String>> {
        let mut folded = Vec::new();
        for id in absorbed {
            let done = self.book.mutate(id, AlertEventKind::StatusChanged, |a| {
                if a.status != AlertStatus::Open {
                    return false;
                }
                a.status = AlertStatus::Merged;
                a.merged_into = Some(target.to_string());
                a.last_updated_at = Utc::now();
                true
            })?;
            if let Some(a) = done {
                info!(alert_id = %a.alert_id, merged_into = target, "alert consolidated");
                folded.push(a);
            }
        }

        let merged = self.book.mutate(target, AlertEventKind::Updated, |a| {
            if a.status != AlertStatus::Open {
                return false;
            }
            for other in &folded {
                absorb_into(
                    a,
                    other.timestamp_range,
                    other.occurrence_count,
                    other.severity,
                    other.similarity,
                );
                if other.severity > a.severity {
                    a.rationale = other.rationale.clone();
                }
            }
            let range = TimeRange {
                start: segment.start_time,
                end: segment.end_time,
            };
            if scored.severity > a.severity {
                a.rationale = scored.rationale.clone();
                a.judged = scored.judged;
            }
            absorb_into(a, range, 1, scored.severity, candidate.similarity);
            self.plan_actions(a);
            a.last_updated_at = Utc::now();
            true
        })?;

        Ok(merged.map(|a| {
            debug!(
                alert_id = %a.alert_id,
                occurrences = a.occurrence_count,
                severity = %a.severity,
                "merged into alert"
            );
            a.alert_id
        }))
    }

    fn plan_actions(&self, alert: &mut Alert) {
        let plan = &self.config.actions;
        alert.action_required = plan.requires_action(alert.severity);
        alert.action_items = plan.steps(alert.severity, alert.category);
    }
}

fn absorb_into(
    alert: &mut Alert,
    range: TimeRange,
    occurrences: u32,
    severity: Severity,
    similarity: f32,
) {
    alert.occurrence_count = alert.occurrence_count.saturating_add(occurrences);
    alert.timestamp_range.start = alert.timestamp_range.start.min(range.start);
    alert.timestamp_range.end = alert.timestamp_range.end.max(range.end);
    alert.severity = alert.severity.max(severity);
    alert.similarity = alert.similarity.max(similarity);
}

fn new_alert(segment: &TranscriptSegment, candidate: &MatchCandidate, scored: &Scored) -> Alert {
    let now = Utc::now();
    let passage = &candidate.passage;
    Alert {
        alert_id: Uuid::new_v4().to_string(),
        speaker_id: segment.speaker_id.clone(),
        timestamp_range: TimeRange {
            start: segment.start_time,
            end: segment.end_time,
        },
        transcript_excerpt: segment.text.clone(),
        matched_citation: passage.citation.clone(),
        matched_document_id: passage.document_id.clone(),
        matched_passage_id: passage.passage_id.clone(),
        matched_passage_text: passage.text.clone(),
        category: passage.category,
        embedding_version: passage.embedding_version.clone(),
        similarity: candidate.similarity,
        severity: scored.severity,
        rationale: scored.rationale.clone(),
        judged: scored.judged,
        status: AlertStatus::Open,
        created_at: now,
        last_updated_at: now,
        occurrence_count: 1,
        merged_into: None,
        action_required: false,
        action_items: Vec::new(),
        acknowledged_by: None,
        acknowledged_at: None,
        dismissed_by: None,
        dismissed_at: None,
    }
}
