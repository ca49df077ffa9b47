use async_trait::async_trait;
use chrono::Utc;
use paperless_common::DocumentId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{DbResult, Document, DocumentStore};

/// In-memory [`DocumentStore`] for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    rows: Arc<Mutex<BTreeMap<i32, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document with an empty summary and return its id, or `None`
    /// once the id space is used up.
    pub fn insert(&self, file_name: &str, byte_size: i64) -> Option<DocumentId> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let next = match rows.keys().next_back() {
            Some(last) => last.checked_add(1)?,
            None => 1,
        };
        let id = DocumentId::new(next).ok()?;
        let now = Utc::now();
        rows.insert(
            next,
            Document {
                id: next,
                file_name: file_name.to_string(),
                byte_size,
                summary: String::new(),
                created_at: now,
                last_modified: now,
            },
        );
        Some(id)
    }

    /// Add a document under a specific id, replacing any existing row.
    pub fn insert_with_id(&self, id: DocumentId, file_name: &str, byte_size: i64) {
        let now = Utc::now();
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id.get(),
            Document {
                id: id.get(),
                file_name: file_name.to_string(),
                byte_size,
                summary: String::new(),
                created_at: now,
                last_modified: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, id: DocumentId) {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id.get());
    }

    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id.get())
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn update_summary(&self, id: DocumentId, summary: &str) -> DbResult<bool> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        match rows.get_mut(&id.get()) {
            Some(document) => {
                document.summary = summary.to_string();
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_summary_touches_only_summary() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("sample.pdf", 2048).unwrap();
        let before = store.get(id).unwrap();

        assert!(store.update_summary(id, "A summary of the sample.").await.unwrap());

        let after = store.get(id).unwrap();
        assert_eq!(after.summary, "A summary of the sample.");
        assert_eq!(after.file_name, before.file_name);
        assert_eq!(after.byte_size, before.byte_size);
        assert_eq!(after.last_modified, before.last_modified);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("gone.pdf", 1).unwrap();
        store.remove(id);
        assert!(!store.update_summary(id, "irrelevant summary").await.unwrap());
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = MemoryDocumentStore::new();
        let first = store.insert("a.pdf", 1).unwrap();
        let second = store.insert("b.pdf", 1).unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
    }

    #[test]
    fn test_insert_stops_at_id_space_end() {
        let store = MemoryDocumentStore::new();
        store.insert_with_id(DocumentId::new(i32::MAX).unwrap(), "last.pdf", 1);

        assert!(store.insert("overflow.pdf", 1).is_none());
        assert_eq!(store.len(), 1);
    }
}
