use crate::storage::{DocumentKey, DocumentStore};
use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Documents as `<dir>/warehouse.md` and `<dir>/advice.md`. Every write first copies the
/// previous content to `<stem>.backup.<timestamp>.md`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, key: DocumentKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn backup_prefix(key: DocumentKey) -> String {
        format!("{}.backup.", key.stem())
    }

    async fn backup(&self, key: DocumentKey) -> anyhow::Result<Option<PathBuf>> {
        let path = self.path(key);
        let previous = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let backup_path = self
            .dir
            .join(format!("{}{timestamp}.md", Self::backup_prefix(key)));
        tokio::fs::write(&backup_path, previous)
            .await
            .with_context(|| format!("failed to write backup {}", backup_path.display()))?;
        Ok(Some(backup_path))
    }
}

#[async_trait::async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, key: DocumentKey) -> anyhow::Result<String> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn write(&self, key: DocumentKey, text: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        match self.backup(key).await {
            Ok(Some(backup_path)) => {
                tracing::debug!(document = %key, backup = %backup_path.display(), "backed up document")
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(document = %key, error = %err, "backup failed; writing anyway"),
        }

        let path = self.path(key);
        let tmp = self.dir.join(format!("{}.tmp", key.file_name()));
        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;

        tracing::info!(document = %key, bytes = text.len(), "document written");
        Ok(())
    }

    async fn list_backups(&self, key: DocumentKey) -> anyhow::Result<Vec<String>> {
        let prefix = Self::backup_prefix(key);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to list {}", self.dir.display()))
            }
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".md") {
                out.push(name);
            }
        }
        // Timestamps sort lexically.
        out.sort();
        out.reverse();
        Ok(out)
    }
}
