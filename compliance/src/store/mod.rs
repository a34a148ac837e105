//! Durable state for alerts and documents.

mod memory;
mod redb;

pub use memory::MemoryStore;
pub use redb::RedbStore;

use crate::error::StoreError;
use crate::types::{Alert, Document};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persists every alert and document mutation. Writes are upserts keyed by
/// id; nothing is ever deleted.
pub trait AlertStore: Send + Sync {
    fn put_alert(&self, alert: &Alert) -> StoreResult<()>;

    fn load_alerts(&self) -> StoreResult<Vec<Alert>>;

    fn put_document(&self, document: &Document) -> StoreResult<()>;

    fn load_documents(&self) -> StoreResult<Vec<Document>>;
}
