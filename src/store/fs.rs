// src/store/fs.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{RecordStore, StoreConfig};
use crate::error::{PipelineError, Result};

/// Directory-backed container, e.g. a blob container mounted by the scheduler.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            dir: config.root.join(config.container),
        }
    }

    /// Use `dir` itself as the container (mounted inputs have no parent root).
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains("..") || Path::new(name).is_absolute() {
            return Err(PipelineError::io(
                self.dir.join(name),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid blob name"),
            ));
        }
        Ok(self.dir.join(name))
    }
}

/// Write-then-rename so a crash never leaves a half-written file at `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| PipelineError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PipelineError::io(path, e));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for FsStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.blob_path(name)?;
        write_atomic(&path, &bytes).await?;
        tracing::debug!(blob = %path.display(), bytes = bytes.len(), "blob written");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::io(path, e))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| PipelineError::io(&self.dir, e))?;
        let mut names = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| PipelineError::io(&self.dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_file && !name.ends_with(".tmp") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.dir.display())
    }
}
