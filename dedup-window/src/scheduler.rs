use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval_at;
use tokio::time::timeout;

use super::ReportSink;
use super::SinkError;
use super::Snapshot;
use super::WindowTracker;

const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
struct SchedulerMetrics {
    delivered: Counter<u64>,
    failed: Counter<u64>,
}

impl SchedulerMetrics {
    fn new() -> Self {
        let meter = global::meter("dedup_window");
        Self {
            delivered: meter.u64_counter("reports_delivered").build(),
            failed: meter.u64_counter("reports_failed").build(),
        }
    }
}

/// Rolls the window over once per period and reports the outgoing count.
///
/// The first rollover happens one full period after [`Scheduler::start`] unless
/// [`Scheduler::with_first_tick_after`] says otherwise. Each report is delivered from
/// its own task, so a slow sink never delays the next tick.
#[derive(Debug)]
pub struct Scheduler {
    tracker: Arc<WindowTracker>,
    sink: Arc<dyn ReportSink>,
    period: Duration,
    first_tick_after: Duration,
    report_timeout: Duration,
    flush_on_shutdown: bool,
}

/// Controls a running [`Scheduler`].
///
/// Dropping the handle stops the scheduler as if [`SchedulerHandle::shutdown`] had
/// been called, without waiting for it.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the timer loop and waits for it to finish.
    ///
    /// If final flushing is enabled the partial window is rolled over and its report
    /// delivered (bounded by the report timeout) before this returns.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::error!(%err, "scheduler task failed");
        }
    }
}

impl Scheduler {
    pub fn new(tracker: Arc<WindowTracker>, sink: Arc<dyn ReportSink>, period: Duration) -> Self {
        Self {
            tracker,
            sink,
            period,
            first_tick_after: period,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            flush_on_shutdown: true,
        }
    }

    /// Set the delay before the first rollover; later ones follow every period.
    ///
    /// Processes sharing a store pass the time left until the wall-clock boundary
    /// (see [`crate::wall_clock_window`]) so their windows end together.
    pub fn with_first_tick_after(mut self, first_tick_after: Duration) -> Self {
        self.first_tick_after = first_tick_after;
        self
    }

    /// Set the upper bound on a single report delivery.
    pub fn with_report_timeout(mut self, report_timeout: Duration) -> Self {
        self.report_timeout = report_timeout;
        self
    }

    /// Set whether shutdown rolls over and reports the partial window.
    pub fn with_flush_on_shutdown(mut self, flush_on_shutdown: bool) -> Self {
        self.flush_on_shutdown = flush_on_shutdown;
        self
    }

    /// Spawns the timer loop onto the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let metrics = SchedulerMetrics::new();
        let mut ticker = interval_at(Instant::now() + self.first_tick_after, self.period);
        // Every boundary gets its own report, even after a stall
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        tracing::info!(
            period = ?self.period,
            first_tick_after = ?self.first_tick_after,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(snapshot) = self.flush().await {
                        tokio::spawn(deliver(
                            Arc::clone(&self.sink),
                            snapshot,
                            self.report_timeout,
                            metrics.clone(),
                        ));
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if self.flush_on_shutdown
            && let Some(snapshot) = self.flush().await
        {
            deliver(
                Arc::clone(&self.sink),
                snapshot,
                self.report_timeout,
                metrics,
            )
            .await;
        }

        tracing::info!("scheduler stopped");
    }

    async fn flush(&self) -> Option<Snapshot> {
        match self.tracker.rollover().await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => None,
            Err(err) => {
                tracing::error!(%err, "failed to snapshot window");
                None
            }
        }
    }
}

async fn deliver(
    sink: Arc<dyn ReportSink>,
    snapshot: Snapshot,
    report_timeout: Duration,
    metrics: SchedulerMetrics,
) {
    let result = match timeout(report_timeout, sink.report(snapshot)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout),
    };

    match result {
        Ok(()) => metrics.delivered.add(1, &[]),
        Err(err) => {
            metrics.failed.add(1, &[]);
            tracing::warn!(
                window = snapshot.window,
                count = snapshot.count,
                %err,
                "failed to deliver report"
            );
        }
    }
}
