use courier_common::config::AppConfig;
use courier_common::telemetry;
use courier_worker::service::EmailService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    telemetry::init(&config.logs)?;

    tracing::info!(
        service = %config.app_name,
        provider = %config.email.provider,
        storage = %config.storage.storage_type,
        "Courier email worker starting..."
    );

    let service = match EmailService::bootstrap(config).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start email worker");
            return Err(e.into());
        }
    };

    service.run().await
}
