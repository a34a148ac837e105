//! Document records and their ingestion lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ComplianceError, Result};
use crate::store::AlertStore;
use crate::types::{Document, DocumentStatus};

/// Durable registry of uploaded documents. Status changes wake
/// [`DocumentRegistry::wait`] callers.
pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, Document>>,
    store: Arc<dyn AlertStore>,
    changes: watch::Sender<u64>,
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            documents: RwLock::new(HashMap::new()),
            store,
            changes,
        }
    }

    /// Loads stored documents. Documents an interrupted run left pending or
    /// processing become failed and retryable.
    pub fn restore(&self) -> Result<Vec<Document>> {
        let mut loaded = self.store.load_documents()?;
        for doc in &mut loaded {
            if !doc.status.is_terminal() {
                warn!(document_id = %doc.document_id, status = %doc.status, "ingestion interrupted");
                doc.status = DocumentStatus::Failed;
                doc.retryable = true;
                doc.last_error = Some("ingestion interrupted by shutdown".into());
                doc.updated_at = Utc::now();
                self.store.put_document(doc)?;
            }
        }
        let mut documents = self.documents.write();
        documents.clear();
        for doc in &loaded {
            documents.insert(doc.document_id.clone(), doc.clone());
        }
        info!(documents = loaded.len(), "documents restored");
        Ok(loaded)
    }

    pub fn insert(&self, document: Document) -> Result<()> {
        {
            let mut documents = self.documents.write();
            self.store.put_document(&document)?;
            documents.insert(document.document_id.clone(), document);
        }
        self.changes.send_modify(|v| *v += 1);
        Ok(())
    }

    pub fn get(&self, document_id: &str) -> Option<Document> {
        self.documents.read().get(document_id).cloned()
    }

    /// All documents, oldest first.
    pub fn list(&self) -> Vec<Document> {
        let mut out: Vec<Document> = self.documents.read().values().cloned().collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        out
    }

    /// Applies `f` and persists the result.
    pub fn update<F>(&self, document_id: &str, f: F) -> Result<Document>
    where
        F: FnOnce(&mut Document),
    {
        let updated = {
            let mut documents = self.documents.write();
            let Some(current) = documents.get(document_id) else {
                return Err(ComplianceError::not_found("document", document_id));
            };
            let mut next = current.clone();
            f(&mut next);
            next.updated_at = Utc::now();
            self.store.put_document(&next)?;
            documents.insert(document_id.to_string(), next.clone());
            next
        };
        self.changes.send_modify(|v| *v += 1);
        Ok(updated)
    }

    /// Moves a document back to pending for another ingestion run when
    /// `allowed` accepts its current status.
    pub fn requeue<F>(
        &self,
        document_id: &str,
        action: &str,
        allowed: impl Fn(DocumentStatus) -> bool,
        f: F,
    ) -> Result<Document>
    where
        F: FnOnce(&mut Document),
    {
        let updated = {
            let mut documents = self.documents.write();
            let Some(current) = documents.get(document_id) else {
                return Err(ComplianceError::not_found("document", document_id));
            };
            if !allowed(current.status) {
                return Err(ComplianceError::DocumentBusy {
                    document_id: document_id.to_string(),
                    action: action.to_string(),
                    status: current.status.to_string(),
                });
            }
            let mut next = current.clone();
            f(&mut next);
            next.status = DocumentStatus::Pending;
            next.last_error = None;
            next.retryable = false;
            next.updated_at = Utc::now();
            self.store.put_document(&next)?;
            documents.insert(document_id.to_string(), next.clone());
            next
        };
        self.changes.send_modify(|v| *v += 1);
        Ok(updated)
    }

    /// Waits until the document reaches `processed` or `failed`.
    pub async fn wait(&self, document_id: &str) -> Result<Document> {
        let mut rx = self.changes.subscribe();
        loop {
            let doc = self
                .get(document_id)
                .ok_or_else(|| ComplianceError::not_found("document", document_id))?;
            if doc.status.is_terminal() {
                return Ok(doc);
            }
            // The sender lives as long as self.
            if rx.changed().await.is_err() {
                return Err(ComplianceError::not_found("document", document_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    fn doc(id: &str, status: DocumentStatus) -> Document {
        let now = Utc::now();
        Document {
            document_id: id.into(),
            title: "Title".into(),
            raw_text: "text".into(),
            category: None,
            category_overridden: false,
            subcategories: Vec::new(),
            keywords: Vec::new(),
            key_phrases: Vec::new(),
            classification_confidence: 0.0,
            status,
            passage_count: 0,
            failed_passages: 0,
            retryable: false,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_restore_fails_interrupted() {
        let store = Arc::new(MemoryStore::new());
        store.put_document(&doc("a", DocumentStatus::Processing)).unwrap();
        store.put_document(&doc("b", DocumentStatus::Processed)).unwrap();

        let reg = DocumentRegistry::new(store.clone());
        reg.restore().unwrap();
        let a = reg.get("a").unwrap();
        assert_eq!(a.status, DocumentStatus::Failed);
        assert!(a.retryable);
        assert_eq!(reg.get("b").unwrap().status, DocumentStatus::Processed);
        // Persisted too.
        let stored = store.load_documents().unwrap();
        assert!(stored.iter().any(|d| d.document_id == "a" && d.status == DocumentStatus::Failed));
    }

    #[test]
    fn test_requeue_rejects_in_flight() {
        let reg = DocumentRegistry::new(Arc::new(MemoryStore::new()));
        reg.insert(doc("a", DocumentStatus::Processing)).unwrap();
        let err = reg
            .requeue("a", "retry", |s| s == DocumentStatus::Failed, |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        reg.update("a", |d| d.status = DocumentStatus::Failed).unwrap();
        let d = reg
            .requeue("a", "retry", |s| s == DocumentStatus::Failed, |_| {})
            .unwrap();
        assert_eq!(d.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_terminal_status() {
        let reg = Arc::new(DocumentRegistry::new(Arc::new(MemoryStore::new())));
        reg.insert(doc("a", DocumentStatus::Pending)).unwrap();

        let waiter = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.wait("a").await })
        };
        tokio::task::yield_now().await;
        reg.update("a", |d| d.status = DocumentStatus::Processing).unwrap();
        reg.update("a", |d| d.status = DocumentStatus::Processed).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got.status, DocumentStatus::Processed);
        assert!(reg.wait("missing").await.is_err());
    }
}
