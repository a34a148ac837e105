//! Alert state, queries, actions and event fan-out.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{ComplianceError, Result, SinkError};
use crate::store::AlertStore;
use crate::taxonomy::Category;
use crate::types::{Alert, AlertAction, AlertStatus, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    Created,
    /// A segment was merged in, or other alerts were consolidated into it.
    Updated,
    StatusChanged,
}

/// Pushed to subscribers and sinks after the change is durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub alert: Alert,
}

/// Receives alert events, e.g. a dashboard socket or a notifier.
///
/// Delivery is fire-and-forget: failures are logged and never affect the
/// stored alert.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, event: &AlertEvent) -> std::result::Result<(), SinkError>;

    fn name(&self) -> &str {
        "sink"
    }
}

/// Query over stored alerts. Empty fields match everything; `since`/`until`
/// bound `created_at`.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub min_severity: Option<Severity>,
    pub speaker_id: Option<String>,
    pub category: Option<Category>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: AlertStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn speaker(mut self, speaker_id: impl Into<String>) -> Self {
        self.speaker_id = Some(speaker_id.into());
        self
    }

    pub fn accepts(&self, alert: &Alert) -> bool {
        self.status.is_none_or(|s| alert.status == s)
            && self.severity.is_none_or(|s| alert.severity == s)
            && self.min_severity.is_none_or(|s| alert.severity >= s)
            && self.category.is_none_or(|c| alert.category == c)
            && self
                .speaker_id
                .as_deref()
                .is_none_or(|s| alert.speaker_id == s)
            && self.since.is_none_or(|t| alert.created_at >= t)
            && self.until.is_none_or(|t| alert.created_at <= t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertStats {
    pub total: usize,
    pub open: usize,
    pub acknowledged: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_status: BTreeMap<AlertStatus, usize>,
    pub by_category: BTreeMap<Category, usize>,
}

enum Transition {
    To(AlertStatus),
    Noop,
    Conflict,
}

fn transition(status: AlertStatus, action: AlertAction) -> Transition {
    use AlertAction::*;
    use AlertStatus::*;
    match (status, action) {
        (Open, Acknowledge) => Transition::To(Acknowledged),
        (Open | Acknowledged, Dismiss) => Transition::To(Dismissed),
        (Acknowledged, Acknowledge) | (Dismissed, Dismiss) => Transition::Noop,
        (Dismissed, Acknowledge) | (Merged, _) => Transition::Conflict,
    }
}

/// Owner of all alerts. Every mutation is written to the store before the
/// in-memory copy changes and before any event goes out.
pub struct AlertBook {
    alerts: RwLock<HashMap<String, Alert>>,
    store: Arc<dyn AlertStore>,
    events: broadcast::Sender<AlertEvent>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
}

impl AlertBook {
    pub fn new(store: Arc<dyn AlertStore>, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            alerts: RwLock::new(HashMap::new()),
            store,
            events,
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Loads stored alerts, replacing the in-memory state.
    pub fn restore(&self) -> Result<Vec<Alert>> {
        let loaded = self.store.load_alerts()?;
        let mut alerts = self.alerts.write();
        alerts.clear();
        for a in &loaded {
            alerts.insert(a.alert_id.clone(), a.clone());
        }
        info!(alerts = loaded.len(), "alerts restored");
        Ok(loaded)
    }

    pub fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.write().push(sink);
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.read().get(alert_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matching alerts, most severe first, then most recently updated.
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut out: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|a| filter.accepts(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.last_updated_at.cmp(&a.last_updated_at))
                .then_with(|| a.alert_id.cmp(&b.alert_id))
        });
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    pub fn stats(&self) -> AlertStats {
        let alerts = self.alerts.read();
        let mut stats = AlertStats {
            total: alerts.len(),
            ..Default::default()
        };
        for a in alerts.values() {
            *stats.by_severity.entry(a.severity).or_default() += 1;
            *stats.by_status.entry(a.status).or_default() += 1;
            *stats.by_category.entry(a.category).or_default() += 1;
            match a.status {
                AlertStatus::Open => stats.open += 1,
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                _ => {}
            }
        }
        stats
    }

    /// Applies an external action on behalf of `actor`, recording who made
    /// the change and when. Repeating an action is a no-op success and keeps
    /// the first attribution; reviving a dismissed alert or touching a
    /// merged one is a conflict.
    pub fn apply(&self, alert_id: &str, action: AlertAction, actor: Option<&str>) -> Result<Alert> {
        let mut conflict = None;
        let changed = self.mutate(alert_id, AlertEventKind::StatusChanged, |a| {
            match transition(a.status, action) {
                Transition::To(next) => {
                    let now = Utc::now();
                    let by = actor.map(str::to_string);
                    match next {
                        AlertStatus::Acknowledged => {
                            a.acknowledged_by = by;
                            a.acknowledged_at = Some(now);
                        }
                        _ => {
                            a.dismissed_by = by;
                            a.dismissed_at = Some(now);
                        }
                    }
                    a.status = next;
                    a.last_updated_at = now;
                    true
                }
                Transition::Noop => false,
                Transition::Conflict => {
                    conflict = Some(a.status);
                    false
                }
            }
        })?;

        if let Some(status) = conflict {
            return Err(ComplianceError::InvalidTransition {
                alert_id: alert_id.to_string(),
                action: action.to_string(),
                status: status.to_string(),
            });
        }
        match changed {
            Some(alert) => {
                info!(
                    alert_id,
                    %action,
                    actor = actor.unwrap_or("-"),
                    status = %alert.status,
                    "alert status changed"
                );
                Ok(alert)
            }
            None => self
                .get(alert_id)
                .ok_or_else(|| ComplianceError::not_found("alert", alert_id)),
        }
    }

    pub(crate) fn create(&self, alert: Alert) -> Result<()> {
        {
            let mut alerts = self.alerts.write();
            self.store.put_alert(&alert)?;
            alerts.insert(alert.alert_id.clone(), alert.clone());
        }
        self.publish(AlertEvent {
            kind: AlertEventKind::Created,
            alert,
        });
        Ok(())
    }

    /// Applies `f` to a copy of the alert under the write lock. When `f`
    /// returns true the copy is stored, swapped in and published.
    pub(crate) fn mutate<F>(&self, alert_id: &str, kind: AlertEventKind, f: F) -> Result<Option<Alert>>
    where
        F: FnOnce(&mut Alert) -> bool,
    {
        let updated = {
            let mut alerts = self.alerts.write();
            let Some(current) = alerts.get(alert_id) else {
                return Err(ComplianceError::not_found("alert", alert_id));
            };
            let mut next = current.clone();
            if !f(&mut next) {
                return Ok(None);
            }
            self.store.put_alert(&next)?;
            alerts.insert(alert_id.to_string(), next.clone());
            next
        };
        self.publish(AlertEvent {
            kind,
            alert: updated.clone(),
        });
        Ok(Some(updated))
    }

    fn publish(&self, event: AlertEvent) {
        let sinks: Vec<_> = self.sinks.read().iter().cloned().collect();
        if !sinks.is_empty() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    for sink in sinks {
                        let event = event.clone();
                        handle.spawn(async move {
                            if let Err(e) = sink.deliver(&event).await {
                                warn!(
                                    sink = sink.name(),
                                    alert_id = %event.alert.alert_id,
                                    error = %e,
                                    "alert delivery failed"
                                );
                            }
                        });
                    }
                }
                Err(_) => warn!(alert_id = %event.alert.alert_id, "no runtime, alert sinks skipped"),
            }
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::types::TimeRange;

    fn alert(id: &str, severity: Severity) -> Alert {
        let now = Utc::now();
        Alert {
            alert_id: id.into(),
            speaker_id: "S1".into(),
            timestamp_range: TimeRange { start: 0.0, end: 2.0 },
            transcript_excerpt: "excerpt".into(),
            matched_citation: "Rule".into(),
            matched_document_id: "doc".into(),
            matched_passage_id: "doc:1:0".into(),
            matched_passage_text: "text".into(),
            category: Category::Financial,
            embedding_version: "v1".into(),
            similarity: 0.8,
            severity,
            rationale: "Rule".into(),
            judged: false,
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

    fn book() -> AlertBook {
        AlertBook::new(Arc::new(MemoryStore::new()), 16)
    }

    #[test]
    fn test_actions_are_idempotent() {
        let b = book();
        b.create(alert("a", Severity::High)).unwrap();

        let got = b.apply("a", AlertAction::Acknowledge, None).unwrap();
        assert_eq!(got.status, AlertStatus::Acknowledged);
        let again = b.apply("a", AlertAction::Acknowledge, None).unwrap();
        assert_eq!(again.status, AlertStatus::Acknowledged);

        let got = b.apply("a", AlertAction::Dismiss, None).unwrap();
        assert_eq!(got.status, AlertStatus::Dismissed);
        b.apply("a", AlertAction::Dismiss, None).unwrap();

        let err = b.apply("a", AlertAction::Acknowledge, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = b.apply("missing", AlertAction::Dismiss, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_actions_record_actor_and_time() {
        let b = book();
        b.create(alert("a", Severity::High)).unwrap();
        b.create(alert("b", Severity::High)).unwrap();

        let acked = b.apply("a", AlertAction::Acknowledge, Some("officer-7")).unwrap();
        assert_eq!(acked.acknowledged_by.as_deref(), Some("officer-7"));
        let acked_at = acked.acknowledged_at.unwrap();
        assert!(acked_at >= acked.created_at);
        assert!(acked.dismissed_at.is_none());

        // A repeat keeps the first attribution.
        let again = b.apply("a", AlertAction::Acknowledge, Some("someone-else")).unwrap();
        assert_eq!(again.acknowledged_by.as_deref(), Some("officer-7"));
        assert_eq!(again.acknowledged_at, Some(acked_at));

        let dismissed = b.apply("a", AlertAction::Dismiss, Some("lead")).unwrap();
        assert_eq!(dismissed.dismissed_by.as_deref(), Some("lead"));
        assert!(dismissed.dismissed_at.is_some());
        assert_eq!(dismissed.acknowledged_by.as_deref(), Some("officer-7"));

        let anonymous = b.apply("b", AlertAction::Dismiss, None).unwrap();
        assert!(anonymous.dismissed_by.is_none());
        assert!(anonymous.dismissed_at.is_some());
    }

    #[test]
    fn test_attribution_survives_restore() {
        let store = Arc::new(MemoryStore::new());
        let b = AlertBook::new(store.clone(), 16);
        b.create(alert("a", Severity::Medium)).unwrap();
        b.apply("a", AlertAction::Acknowledge, Some("officer-7")).unwrap();

        let fresh = AlertBook::new(store, 16);
        fresh.restore().unwrap();
        let a = fresh.get("a").unwrap();
        assert_eq!(a.acknowledged_by.as_deref(), Some("officer-7"));
        assert!(a.acknowledged_at.is_some());
    }

    #[test]
    fn test_merged_alerts_reject_actions() {
        let b = book();
        let mut a = alert("m", Severity::Low);
        a.status = AlertStatus::Merged;
        a.merged_into = Some("x".into());
        b.create(a).unwrap();
        assert_eq!(
            b.apply("m", AlertAction::Dismiss, None).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_list_filters_and_ranks() {
        let b = book();
        b.create(alert("low", Severity::Low)).unwrap();
        b.create(alert("crit", Severity::Critical)).unwrap();
        let mut other = alert("s2", Severity::High);
        other.speaker_id = "S2".into();
        b.create(other).unwrap();
        b.apply("low", AlertAction::Dismiss, None).unwrap();

        let all = b.list(&AlertFilter::new());
        assert_eq!(all[0].alert_id, "crit");
        assert_eq!(all.len(), 3);

        let open = b.list(&AlertFilter::new().status(AlertStatus::Open));
        assert_eq!(open.len(), 2);

        let high = b.list(&AlertFilter::new().min_severity(Severity::High).speaker("S1"));
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].alert_id, "crit");

        let limited = b.list(&AlertFilter { limit: Some(1), ..Default::default() });
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_stats() {
        let b = book();
        b.create(alert("a", Severity::Low)).unwrap();
        b.create(alert("b", Severity::Low)).unwrap();
        b.create(alert("c", Severity::High)).unwrap();
        b.apply("c", AlertAction::Acknowledge, None).unwrap();

        let s = b.stats();
        assert_eq!(s.total, 3);
        assert_eq!(s.open, 2);
        assert_eq!(s.acknowledged, 1);
        assert_eq!(s.by_severity[&Severity::Low], 2);
        assert_eq!(s.by_category[&Category::Financial], 3);
    }

    #[test]
    fn test_store_written_and_restored() {
        let store = Arc::new(MemoryStore::new());
        let b = AlertBook::new(store.clone(), 16);
        b.create(alert("a", Severity::Medium)).unwrap();
        b.apply("a", AlertAction::Dismiss, None).unwrap();

        let fresh = AlertBook::new(store, 16);
        assert!(fresh.is_empty());
        fresh.restore().unwrap();
        assert_eq!(fresh.get("a").unwrap().status, AlertStatus::Dismissed);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let b = book();
        let mut rx = b.subscribe();
        b.create(alert("a", Severity::Medium)).unwrap();
        b.apply("a", AlertAction::Acknowledge, None).unwrap();
        // No-op action publishes nothing.
        b.apply("a", AlertAction::Acknowledge, None).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, AlertEventKind::Created);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, AlertEventKind::StatusChanged);
        assert_eq!(second.alert.status, AlertStatus::Acknowledged);
        assert!(rx.try_recv().is_err());
    }

    struct FailingSink {
        calls: tokio::sync::mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl AlertSink for FailingSink {
        async fn deliver(&self, event: &AlertEvent) -> std::result::Result<(), SinkError> {
            let _ = self.calls.send(event.alert.alert_id.clone());
            Err(SinkError("socket closed".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_alert() {
        let b = book();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        b.add_sink(Arc::new(FailingSink { calls: tx }));
        b.create(alert("a", Severity::Medium)).unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(delivered.as_deref(), Some("a"));
        assert!(b.get("a").is_some());
    }
}
