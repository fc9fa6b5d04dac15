//! Broker startup and shutdown.

use super::routes::{router, BrokerState};
use super::source;
use anyhow::{anyhow, Context};
use distribution_engine::{DistributionConfig, DistributionEngine, SubscriberRegistry};
use fallback_store::{FallbackStore, SqliteStore};
use stampede_core::{Config, Paths};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Run the broker until a shutdown signal arrives or the distribution loop
/// fails.
pub async fn run_broker(config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;

    let store_path = paths.store_file();
    let store = Arc::new(
        SqliteStore::open(&store_path)
            .await
            .with_context(|| format!("failed to open fallback store at {}", store_path.display()))?,
    );

    let engine = Arc::new(DistributionEngine::new(
        DistributionConfig::from(&config.broker),
        SubscriberRegistry::new(),
        store.clone(),
    ));
    let mut distribution = engine.clone().start();
    let producer = source::spawn(engine.clone(), config.broker.produce_interval());

    let listener = TcpListener::bind(&config.broker.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.broker.listen_addr))?;
    info!(
        addr = %config.broker.listen_addr,
        produce_interval_ms = config.broker.produce_interval_ms,
        max_attempts = config.broker.max_attempts,
        archive_undispatched = config.broker.archive_undispatched,
        "Broker listening"
    );

    let app = router(BrokerState {
        engine: engine.clone(),
    });
    let mut server = tokio::spawn(async move { axum::serve(listener, app).await });

    let outcome = tokio::select! {
        result = &mut distribution => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::new(err).context("distribution loop failed")),
            Err(err) => Err(anyhow!("distribution task aborted: {err}")),
        },
        result = &mut server => match result {
            Ok(Ok(())) => Err(anyhow!("HTTP server stopped unexpectedly")),
            Ok(Err(err)) => Err(anyhow::Error::new(err).context("HTTP server failed")),
            Err(err) => Err(anyhow!("HTTP server task aborted: {err}")),
        },
        _ = shutdown_signal() => {
            info!("Received shutdown signal, exiting...");
            Ok(())
        }
    };

    producer.abort();
    server.abort();
    distribution.abort();

    if let Err(err) = store.close().await {
        error!(error = %err, "Failed to close fallback store");
        if outcome.is_ok() {
            return Err(err.into());
        }
    }

    if let Err(err) = &outcome {
        error!(error = %err, "Broker exited with error");
    }
    outcome
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
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
