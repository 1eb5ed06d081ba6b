//! Process wiring: start-up order, the run loop, and bounded shutdown.

use std::sync::Arc;
use std::time::Duration;

use lapin::Consumer;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use courier_api::state::AppState;
use courier_common::config::{AppConfig, StorageKind};
use courier_common::db::MongoDb;
use courier_common::error::StartupError;
use courier_common::telemetry::component_span;
use courier_providers::build_provider;
use courier_storage::{DeliveryLogger, build_storage};

use crate::consumer::QueueConsumer;
use crate::dispatcher::Dispatcher;

/// Upper bound for the whole shutdown sequence.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Every long-lived resource of the worker, connected and ready to serve.
pub struct EmailService {
    config: AppConfig,
    mongodb: Option<MongoDb>,
    storage: Arc<dyn DeliveryLogger>,
    dispatcher: Arc<Dispatcher>,
    consumer: Arc<QueueConsumer>,
    deliveries: Consumer,
    listener: TcpListener,
}

impl EmailService {
    /// Connect everything in dependency order. Any failure aborts start-up.
    pub async fn bootstrap(config: AppConfig) -> Result<Self, StartupError> {
        let storage_kind = config.storage.kind()?;

        let mongodb = if storage_kind == StorageKind::Database {
            Some(MongoDb::connect(&config.database).await?)
        } else {
            None
        };

        let storage = build_storage(&config.storage, mongodb.as_ref()).await?;
        let provider = build_provider(&config.email)?;

        let consumer = QueueConsumer::connect(&config.rabbitmq, component_span("consumer")).await?;
        consumer.setup_topology().await?;
        let deliveries = consumer.consume().await?;

        let listener = courier_api::bind(config.server.port).await?;

        let dispatcher = Dispatcher::new(provider, storage.clone(), component_span("dispatcher"));

        Ok(Self {
            config,
            mongodb,
            storage,
            dispatcher: Arc::new(dispatcher),
            consumer: Arc::new(consumer),
            deliveries,
            listener,
        })
    }

    /// Serve until a termination signal arrives or the delivery stream ends,
    /// then shut down within [`SHUTDOWN_TIMEOUT`].
    pub async fn run(self) -> anyhow::Result<()> {
        let EmailService {
            config,
            mongodb,
            storage,
            dispatcher,
            consumer,
            deliveries,
            listener,
        } = self;

        let (http_stop, http_stopped) = oneshot::channel::<()>();
        let state = AppState::new(config.app_name.clone(), storage.clone());
        let mut http = tokio::spawn(courier_api::serve(
            listener,
            state,
            Duration::from_secs(config.server.request_timeout_secs),
            async move {
                let _ = http_stopped.await;
            },
        ));

        let loop_consumer = consumer.clone();
        let mut consume_loop =
            tokio::spawn(async move { loop_consumer.run(deliveries, &dispatcher).await });

        tracing::info!(service = %config.app_name, "Email worker running");

        let mut loop_finished = false;
        let mut http_finished = false;
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("Received shutdown signal, stopping gracefully...");
            }
            result = &mut consume_loop => {
                loop_finished = true;
                match result {
                    Ok(Ok(())) => tracing::warn!("Consume loop ended, shutting down"),
                    Ok(Err(e)) => tracing::error!(error = %e, "Consume loop failed, shutting down"),
                    Err(e) => tracing::error!(error = %e, "Consume loop panicked, shutting down"),
                }
            }
            result = &mut http => {
                http_finished = true;
                match result {
                    Ok(Ok(())) => tracing::warn!("HTTP server stopped, shutting down"),
                    Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed, shutting down"),
                    Err(e) => tracing::error!(error = %e, "HTTP server panicked, shutting down"),
                }
            }
        }

        let shutdown = async {
            consumer.cancel().await;
            if !loop_finished {
                match consume_loop.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Consume loop ended with error"),
                    Err(e) => tracing::warn!(error = %e, "Consume loop panicked"),
                }
            }

            consumer.close().await;
            storage.close().await;
            if let Some(mongodb) = mongodb {
                mongodb.disconnect().await;
            }

            let _ = http_stop.send(());
            if !http_finished {
                if let Ok(Err(e)) = http.await {
                    tracing::warn!(error = %e, "HTTP server stopped with error");
                }
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await.is_err() {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Shutdown deadline exceeded, exiting anyway"
            );
        }

        tracing::info!("Email worker stopped.");
        Ok(())
    }
}

/// Resolve on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
