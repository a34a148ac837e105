use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{AlertStore, StoreResult};
use crate::error::StoreError;
use crate::types::{Alert, Document};

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

const ALERTS: Table = TableDefinition::new("alerts");
const DOCUMENTS: Table = TableDefinition::new("documents");

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// A persistent store backed by redb. Values are JSON.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = Database::create(path).map_err(storage)?;

        let tx = db.begin_write().map_err(storage)?;
        {
            tx.open_table(ALERTS).map_err(storage)?;
            tx.open_table(DOCUMENTS).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut t = tx.open_table(table).map_err(storage)?;
            t.insert(key, bytes.as_slice()).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, table: Table) -> StoreResult<Vec<T>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let t = tx.open_table(table).map_err(storage)?;

        let mut out = Vec::new();
        for item in t.iter().map_err(storage)? {
            let (_, value) = item.map_err(storage)?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }
}

impl AlertStore for RedbStore {
    fn put_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.put(ALERTS, &alert.alert_id, alert)
    }

    fn load_alerts(&self) -> StoreResult<Vec<Alert>> {
        self.load(ALERTS)
    }

    fn put_document(&self, document: &Document) -> StoreResult<()> {
        self.put(DOCUMENTS, &document.document_id, document)
    }

    fn load_documents(&self) -> StoreResult<Vec<Document>> {
        self.load(DOCUMENTS)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::taxonomy::Category;
    use crate::types::{AlertStatus, DocumentStatus, Severity, TimeRange};

    fn alert(id: &str, status: AlertStatus) -> Alert {
        let now = Utc::now();
        Alert {
            alert_id: id.into(),
            speaker_id: "S1".into(),
            timestamp_range: TimeRange { start: 1.0, end: 2.5 },
            transcript_excerpt: "we have insider information".into(),
            matched_citation: "SEC Rule 10b-5".into(),
            matched_document_id: "doc-1".into(),
            matched_passage_id: "doc-1:1:0".into(),
            matched_passage_text: "It shall be unlawful...".into(),
            category: Category::Securities,
            embedding_version: "hash-fnv1a/256".into(),
            similarity: 0.92,
            severity: Severity::Critical,
            rationale: "SEC Rule 10b-5".into(),
            judged: false,
            status,
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

    #[test]
    fn test_alerts_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("regwatch.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.put_alert(&alert("a1", AlertStatus::Open)).unwrap();
            store.put_alert(&alert("a2", AlertStatus::Open)).unwrap();
            // Upsert replaces.
            store.put_alert(&alert("a1", AlertStatus::Dismissed)).unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        let mut alerts = store.load_alerts().unwrap();
        alerts.sort_by(|a, b| a.alert_id.cmp(&b.alert_id));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].status, AlertStatus::Dismissed);
        assert_eq!(alerts[1].alert_id, "a2");
        assert_eq!(alerts[1].status, AlertStatus::Open);
        assert_eq!(alerts[1].matched_citation, "SEC Rule 10b-5");
    }

    #[test]
    fn test_documents_roundtrip() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("regwatch.redb")).unwrap();
        let now = Utc::now();
        let doc = Document {
            document_id: "doc-1".into(),
            title: "SEC Rule 10b-5".into(),
            raw_text: "text".into(),
            category: Some(Category::Securities),
            category_overridden: false,
            subcategories: vec!["insider trading".into()],
            keywords: vec!["insider".into()],
            key_phrases: vec!["It shall be unlawful to trade on insider information.".into()],
            classification_confidence: 0.75,
            status: DocumentStatus::Failed,
            passage_count: 0,
            failed_passages: 2,
            retryable: true,
            last_error: Some("embed failed".into()),
            created_at: now,
            updated_at: now,
        };
        store.put_document(&doc).unwrap();
        assert_eq!(store.load_documents().unwrap(), vec![doc]);
        assert!(store.load_alerts().unwrap().is_empty());
    }
}
