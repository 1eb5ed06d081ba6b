use std::time::Duration;

use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};

use crate::config::DatabaseConfig;
use crate::error::StartupError;

/// Connected MongoDB client bound to the configured database.
#[derive(Clone)]
pub struct MongoDb {
    client: Client,
    database: Database,
}

impl MongoDb {
    /// Connect and ping MongoDB.
    ///
    /// `timeout_secs` bounds both the TCP connect and server selection, so an
    /// unreachable server fails startup instead of hanging.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StartupError> {
        tracing::info!("Connecting to MongoDB...");

        let timeout = Duration::from_secs(config.timeout_secs);
        let mut options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| StartupError::Database(e.to_string()))?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client =
            Client::with_options(options).map_err(|e| StartupError::Database(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StartupError::Database(format!("ping failed: {e}")))?;

        let database = client.database(&config.name);
        tracing::info!(db = %config.name, "Connected to MongoDB");

        Ok(Self { client, database })
    }

    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Shut the client down, waiting for in-use connections to be returned.
    pub async fn disconnect(self) {
        tracing::info!("Disconnecting from MongoDB...");
        self.client.shutdown().await;
        tracing::info!("MongoDB disconnected");
    }
}
