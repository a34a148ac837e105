use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{AlertStore, StoreResult};
use crate::types::{Alert, Document};

/// In-process store. State is lost when dropped.
#[derive(Default)]
pub struct MemoryStore {
    alerts: RwLock<BTreeMap<String, Alert>>,
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertStore for MemoryStore {
    fn put_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.alerts
            .write()
            .insert(alert.alert_id.clone(), alert.clone());
        Ok(())
    }

    fn load_alerts(&self) -> StoreResult<Vec<Alert>> {
        Ok(self.alerts.read().values().cloned().collect())
    }

    fn put_document(&self, document: &Document) -> StoreResult<()> {
        self.documents
            .write()
            .insert(document.document_id.clone(), document.clone());
        Ok(())
    }

    fn load_documents(&self) -> StoreResult<Vec<Document>> {
        Ok(self.documents.read().values().cloned().collect())
    }
}
