//! Append-only JSON Lines backend with optional size-based rotation.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::Span;

use courier_common::config::FileStorageConfig;
use courier_common::error::StorageError;
use courier_common::types::EmailLog;

use crate::DeliveryLogger;

#[derive(Debug, Clone, Copy)]
struct Rotation {
    max_bytes: u64,
    max_files: u32,
}

struct OpenFile {
    file: File,
    len: u64,
}

/// One JSON record per line, appended to a single file.
///
/// Writes go through a mutex so the HTTP surface can share the handle with
/// the consume loop. `None` in the slot means the logger has been closed.
pub struct FileLogger {
    path: PathBuf,
    rotation: Option<Rotation>,
    slot: Mutex<Option<OpenFile>>,
    span: Span,
}

impl FileLogger {
    /// Open (or create) the log file, creating its directory if needed.
    pub async fn open(config: &FileStorageConfig, span: Span) -> Result<Self, StorageError> {
        let path = config.path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let rotation = if config.max_size_mb > 0 && config.max_files > 0 {
            let max_bytes = config.max_bytes().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("rotation size of {} MB is too large", config.max_size_mb),
                )
            })?;
            Some(Rotation {
                max_bytes,
                max_files: config.max_files,
            })
        } else {
            None
        };

        let file = open_append(&path).await?;
        let len = file.metadata().await?.len();

        tracing::info!(parent: &span, path = %path.display(), "File storage initialized");

        Ok(Self {
            path,
            rotation,
            slot: Mutex::new(Some(OpenFile { file, len })),
            span,
        })
    }

    /// Shift `path.N` to `path.N+1` (dropping the oldest) and start a fresh file.
    async fn rotate(&self, open: &mut OpenFile, rotation: Rotation) -> io::Result<()> {
        open.file.flush().await?;

        let oldest = rotated_path(&self.path, rotation.max_files);
        if fs::try_exists(&oldest).await? {
            fs::remove_file(&oldest).await?;
        }
        for index in (1..rotation.max_files).rev() {
            let from = rotated_path(&self.path, index);
            if fs::try_exists(&from).await? {
                fs::rename(&from, rotated_path(&self.path, index + 1)).await?;
            }
        }
        fs::rename(&self.path, rotated_path(&self.path, 1)).await?;

        open.file = open_append(&self.path).await?;
        open.len = 0;

        tracing::info!(parent: &self.span, path = %self.path.display(), "Rotated email log file");
        Ok(())
    }

    /// Point the handle back at `path` after a failed rotation, which may
    /// have already renamed the active file away.
    async fn reopen(&self, open: &mut OpenFile) -> io::Result<()> {
        let file = open_append(&self.path).await?;
        open.len = file.metadata().await?.len();
        open.file = file;
        Ok(())
    }
}

#[async_trait]
impl DeliveryLogger for FileLogger {
    async fn store(&self, log: &EmailLog) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(log)?;
        line.push(b'\n');
        let line_len = line.len() as u64;

        let mut slot = self.slot.lock().await;
        let open = slot.as_mut().ok_or(StorageError::Closed)?;

        if let Some(rotation) = self.rotation {
            if open.len > 0 && open.len + line_len > rotation.max_bytes {
                if let Err(e) = self.rotate(open, rotation).await {
                    tracing::error!(
                        parent: &self.span,
                        path = %self.path.display(),
                        error = %e,
                        "Failed to rotate email log file, continuing without rotation"
                    );
                    self.reopen(open).await?;
                }
            }
        }

        if let Err(e) = write_line(&mut open.file, &line).await {
            // Drop any partial line so the next record starts on a clean line.
            if let Err(trunc) = open.file.set_len(open.len).await {
                tracing::error!(
                    parent: &self.span,
                    path = %self.path.display(),
                    error = %trunc,
                    "Failed to truncate partial email log line"
                );
            }
            return Err(e.into());
        }
        open.len += line_len;

        tracing::debug!(parent: &self.span, id = %log.id, "Email log entry stored in file");
        Ok(())
    }

    async fn close(&self) {
        let Some(mut open) = self.slot.lock().await.take() else {
            return;
        };

        match open.file.sync_all().await {
            Ok(()) => tracing::info!(parent: &self.span, "File storage closed"),
            Err(e) => tracing::error!(
                parent: &self.span,
                error = %e,
                "Failed to sync email log file on close"
            ),
        }
    }

    fn storage_name(&self) -> &'static str {
        "file"
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

async fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

fn rotated_path(path: &Path, index: u32) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
