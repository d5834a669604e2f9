use std::convert::Infallible;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use dedup_window::Id;
use dedup_window::WindowTracker;
use futures::future::BoxFuture;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tower::Service;

use crate::notify::NotifyDispatcher;

/// One accepted request id, plus the endpoint that wants to hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub id: Id,
    /// Never empty: blank endpoints are treated as absent.
    pub endpoint: Option<String>,
}

/// What happened to an [`Observation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting in the active window.
    New,
    /// Already seen in the active window.
    Duplicate,
    /// The store could not be reached; the id may or may not have been counted.
    Unconfirmed,
}

#[derive(Clone, Debug)]
struct ObserveServiceMetrics {
    observations: Counter<u64>,
    unique: Counter<u64>,
    unconfirmed: Counter<u64>,
}

impl ObserveServiceMetrics {
    fn new() -> Self {
        let meter = global::meter("observe_service");
        Self {
            observations: meter.u64_counter("observations").build(),
            unique: meter.u64_counter("unique_observations").build(),
            unconfirmed: meter.u64_counter("unconfirmed_observations").build(),
        }
    }
}

/// Records observations in the active window.
///
/// Always ready and never fails: store errors become [`Outcome::Unconfirmed`].
/// A new id with an endpoint triggers a notification on a background task, so the
/// caller never waits on the outbound call.
#[derive(Clone, Debug)]
pub struct ObserveService {
    tracker: Arc<WindowTracker>,
    notifier: NotifyDispatcher,
    instruments: ObserveServiceMetrics,
}

impl ObserveService {
    pub fn new(tracker: Arc<WindowTracker>, notifier: NotifyDispatcher) -> Self {
        Self {
            tracker,
            notifier,
            instruments: ObserveServiceMetrics::new(),
        }
    }
}

impl Service<Observation> for ObserveService {
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Outcome, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, observation: Observation) -> Self::Future {
        let tracker = Arc::clone(&self.tracker);
        let notifier = self.notifier.clone();
        let instruments = self.instruments.clone();

        Box::pin(async move {
            instruments.observations.add(1, &[]);

            let outcome = match tracker.observe(observation.id).await {
                Ok(true) => Outcome::New,
                Ok(false) => Outcome::Duplicate,
                Err(err) => {
                    tracing::warn!(id = observation.id, %err, "could not record observation");
                    Outcome::Unconfirmed
                }
            };

            match outcome {
                Outcome::New => instruments.unique.add(1, &[]),
                Outcome::Unconfirmed => instruments.unconfirmed.add(1, &[]),
                Outcome::Duplicate => {}
            }

            if outcome == Outcome::New
                && let Some(endpoint) = observation.endpoint
            {
                tokio::spawn(async move {
                    match tracker.current_count().await {
                        Ok(count) => notifier.notify(&endpoint, count).await,
                        Err(err) => {
                            tracing::warn!(endpoint, %err, "could not read count for notification")
                        }
                    }
                });
            }

            Ok(outcome)
        })
    }
}
