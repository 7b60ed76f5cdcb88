use crate::config::Settings;
use std::fmt;
use std::sync::Arc;

pub mod files;
pub mod ledger;
pub mod memory;
pub mod records;
pub mod remote;

/// The two logical documents the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    /// `warehouse.md`: one holding per line.
    Holdings,
    /// `advice.md`: the advice ledger.
    Advice,
}

impl DocumentKey {
    pub fn stem(&self) -> &'static str {
        match self {
            DocumentKey::Holdings => "warehouse",
            DocumentKey::Advice => "advice",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.stem())
    }

    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "warehouse" => Some(DocumentKey::Holdings),
            "advice" => Some(DocumentKey::Advice),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Whole-document read/write. A missing document reads as empty text.
///
/// Writers are not serialized here; callers sharing a store across processes must
/// coordinate externally.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, key: DocumentKey) -> anyhow::Result<String>;

    async fn write(&self, key: DocumentKey, text: &str) -> anyhow::Result<()>;

    /// Backup names, newest first.
    async fn list_backups(&self, _key: DocumentKey) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Remote store when `ADVICE_STORE_URL` is set, otherwise files under `ADVICE_DATA_DIR`.
pub fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match settings.store_url.as_deref() {
        Some(_) => {
            let url = settings.require_store_url()?;
            Ok(Arc::new(remote::HttpDocumentStore::new(url)?))
        }
        None => Ok(Arc::new(files::FsDocumentStore::new(&settings.data_dir))),
    }
}
