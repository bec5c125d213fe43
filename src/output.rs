//! Persisting rendered documents, or displaying them on a dry run.

use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[async_trait]
pub trait DocumentWriter: Send + Sync {
    async fn write_document(
        &self,
        content: &[u8],
        directory: &Path,
        filename: &str,
        dry_run: bool,
    ) -> Result<()>;
}

/// Writes documents atomically into the target directory, or to stdout when
/// running dry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriter;

impl FileWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentWriter for FileWriter {
    async fn write_document(
        &self,
        content: &[u8],
        directory: &Path,
        filename: &str,
        dry_run: bool,
    ) -> Result<()> {
        let path = directory.join(filename);

        if dry_run {
            let mut stdout = tokio::io::stdout();
            let header = format!("----\nfilename: '{}'\ncontent:\n", path.display());
            stdout.write_all(header.as_bytes()).await?;
            stdout.write_all(content).await?;
            stdout.write_all(b"----\n").await?;
            stdout.flush().await?;
            return Ok(());
        }

        write_atomic(&path, content).await?;
        info!("Wrote {} bytes to {}", content.len(), path.display());

        Ok(())
    }
}

/// Writes to a hidden sibling file and renames it over `path`, so readers
/// never observe a partially written document.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(directory).await?;

    let tmp = temp_path(path);
    debug!("Writing {} via {}", path.display(), tmp.display());

    if let Err(e) = tokio::fs::write(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    tokio::fs::rename(&tmp, path).await?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
