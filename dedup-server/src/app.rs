use std::future::Future;
use std::sync::Arc;

use dedup_window::Backend;
use dedup_window::LocalBackend;
use dedup_window::LogSink;
use dedup_window::ReportSink;
use dedup_window::Scheduler;
use dedup_window::WindowTracker;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::config::SinkKind;
use crate::config::StoreKind;
use crate::error::ServerError;
use crate::ingress::router;
use crate::notify::NotifyDispatcher;
use crate::service::ObserveService;

/// Runs the server until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.listen).await?;
    serve(config, listener, shutdown_signal()).await
}

/// Runs the server on `listener` until `shutdown` completes.
///
/// After the listener has drained, the scheduler is stopped, which reports the
/// partial window unless final flushing is disabled.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let backend = backend(&config).await?;
    let sink = sink(&config)?;
    // Windows are numbered by the wall clock so instances sharing a store agree on them
    let (first_window, until_boundary) = dedup_window::wall_clock_window(config.window);
    let tracker = Arc::new(
        WindowTracker::new(backend, first_window).with_drain_grace(config.drain_grace),
    );
    let mut scheduler = Scheduler::new(Arc::clone(&tracker), sink, config.window);
    if config.store == StoreKind::Redis {
        scheduler = scheduler.with_first_tick_after(until_boundary);
    }
    let scheduler = scheduler
        .with_report_timeout(config.report_timeout)
        .with_flush_on_shutdown(!config.no_final_flush)
        .start();

    let notifier = NotifyDispatcher::new(config.notify_method, config.notify_timeout)?;
    let app = router(ObserveService::new(tracker, notifier));

    tracing::info!(
        addr = %listener.local_addr()?,
        window = ?config.window,
        store = ?config.store,
        sink = ?config.sink,
        "listening"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    tracing::info!("listener closed, stopping scheduler");
    scheduler.shutdown().await;

    served.map_err(ServerError::from)
}

async fn backend(config: &Config) -> Result<Arc<dyn Backend>, ServerError> {
    match config.store {
        StoreKind::Local => Ok(Arc::new(LocalBackend)),
        #[cfg(feature = "redis")]
        StoreKind::Redis => {
            // Keys outlive their window so late readers still find them
            let ttl = config.window * 2;
            let backend =
                dedup_window::RedisBackend::connect(&config.redis_url, &config.redis_prefix, ttl)
                    .await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis"))]
        StoreKind::Redis => Err(crate::error::ConfigError::Unsupported {
            option: "--store redis",
            feature: "redis",
        }
        .into()),
    }
}

fn sink(config: &Config) -> Result<Arc<dyn ReportSink>, ServerError> {
    match config.sink {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        #[cfg(feature = "kafka")]
        SinkKind::Kafka => {
            let sink = dedup_window::KafkaSink::new(&config.kafka_brokers, &config.kafka_topic)?;
            Ok(Arc::new(sink))
        }
        #[cfg(not(feature = "kafka"))]
        SinkKind::Kafka => Err(crate::error::ConfigError::Unsupported {
            option: "--sink kafka",
            feature: "kafka",
        }
        .into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
