//! # dedup-server
//!
//! HTTP front end for [`dedup_window`]. Every request to
//! `GET /api/verve/accept?id=<i64>[&endpoint=<url>]` records the id in the active
//! window. Once per window the number of distinct ids is reported to the configured
//! sink and the window starts again empty.
//!
//! ## Components
//!
//! - [`router`] validates the query and answers `ok` or `400 failed`.
//! - [`ObserveService`] is a tower [`Service`](tower::Service) that records the id and,
//!   for a new id with an endpoint, sends the current count there in the background.
//! - [`app::run`] wires the store, tracker, scheduler and listener together and shuts
//!   them down in order on Ctrl-C or SIGTERM.
//!
//! ## Feature Flags
//!
//! - `redis` (default): `--store redis` shares windows across instances.
//! - `kafka`: `--sink kafka` publishes each count to a Kafka topic.

pub mod app;
mod config;
mod error;
mod ingress;
mod notify;
mod service;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use config::LogFormat;
pub use config::NotifyMethod;
pub use config::SinkKind;
pub use config::StoreKind;
pub use error::ConfigError;
pub use error::IngressError;
pub use error::NotifyError;
pub use error::ServerError;
pub use ingress::ACCEPT_PATH;
pub use ingress::router;
pub use notify::NotifyDispatcher;
pub use service::ObserveService;
pub use service::Observation;
pub use service::Outcome;
