//! Delivery outcome backends.
//!
//! The backend is picked once at startup from `STORAGE_TYPE` by
//! [`build_storage`]. The consume loop and the HTTP surface share the same
//! instance, so implementations must tolerate concurrent `store` calls.

pub mod console;
pub mod database;
pub mod file;

use std::sync::Arc;

use async_trait::async_trait;

use courier_common::config::{StorageConfig, StorageKind};
use courier_common::db::MongoDb;
use courier_common::error::{StartupError, StorageError};
use courier_common::telemetry::component_span;
use courier_common::types::EmailLog;

pub use console::ConsoleLogger;
pub use database::MongoLogger;
pub use file::FileLogger;

/// Trait that every delivery log backend implements.
#[async_trait]
pub trait DeliveryLogger: Send + Sync {
    /// Persist one outcome record.
    async fn store(&self, log: &EmailLog) -> Result<(), StorageError>;

    /// Release backend resources. Idempotent; failures are logged, not returned.
    async fn close(&self);

    /// Identifier of the backend (e.g. "file").
    fn storage_name(&self) -> &'static str;
}

/// Resolve the configured backend into the single instance used for the
/// process lifetime.
///
/// The `database` backend needs the MongoDB handle connected at startup.
pub async fn build_storage(
    config: &StorageConfig,
    mongodb: Option<&MongoDb>,
) -> Result<Arc<dyn DeliveryLogger>, StartupError> {
    let storage: Arc<dyn DeliveryLogger> = match config.kind()? {
        StorageKind::Console => {
            tracing::info!("Using console storage");
            Arc::new(ConsoleLogger::new(component_span("console-storage")))
        }
        StorageKind::File => {
            tracing::info!(path = %config.file.path.display(), "Using file storage");
            Arc::new(FileLogger::open(&config.file, component_span("file-storage")).await?)
        }
        StorageKind::Database => {
            let mongodb = mongodb.ok_or(StartupError::MissingSetting {
                component: "database storage",
                detail: "a MongoDB connection",
            })?;
            tracing::info!(collection = %config.email_collection, "Using database storage");
            Arc::new(MongoLogger::new(
                mongodb.collection(&config.email_collection),
                component_span("database-storage"),
            ))
        }
    };

    Ok(storage)
}

#[cfg(test)]
mod tests {
    use courier_common::config::FileStorageConfig;

    use super::*;

    fn config(storage_type: &str, path: std::path::PathBuf) -> StorageConfig {
        StorageConfig {
            storage_type: storage_type.to_string(),
            file: FileStorageConfig {
                path,
                max_size_mb: 0,
                max_files: 0,
            },
            email_collection: "email_logs".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_console_storage() {
        let storage = build_storage(&config("console", "unused".into()), None)
            .await
            .unwrap();
        assert_eq!(storage.storage_name(), "console");
    }

    #[tokio::test]
    async fn test_build_file_storage_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.jsonl");
        let storage = build_storage(&config("file", path.clone()), None)
            .await
            .unwrap();
        assert_eq!(storage.storage_name(), "file");
        assert!(path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_build_unknown_storage_fails() {
        let err = build_storage(&config("tape", "unused".into()), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::UnknownStorage(s) if s == "tape"));
    }

    #[tokio::test]
    async fn test_build_database_storage_without_connection_fails() {
        let err = build_storage(&config("database", "unused".into()), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::MissingSetting { .. }));
    }
}
