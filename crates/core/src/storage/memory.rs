use crate::storage::{DocumentKey, DocumentStore};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process store, used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<DocumentKey, String>>,
    writes: Mutex<u64>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, key: DocumentKey, text: impl Into<String>) -> Self {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(key, text.into());
        }
        self
    }

    pub fn write_count(&self) -> u64 {
        self.writes.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, key: DocumentKey) -> anyhow::Result<String> {
        let docs = self
            .docs
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(docs.get(&key).cloned().unwrap_or_default())
    }

    async fn write(&self, key: DocumentKey, text: &str) -> anyhow::Result<()> {
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        docs.insert(key, text.to_string());
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }
}
