use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use dedup_window::SinkError;
use dedup_window::StoreError;

/// Errors produced while handling an inbound request.
///
/// Only request validation can fail a request. Anything that goes wrong after the id
/// has been accepted is logged and the caller still gets `ok`.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// `id` was missing or not an integer.
    ///
    /// Converts to `400 Bad Request` with the body `failed`.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryRejection),
}

impl axum::response::IntoResponse for IngressError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        tracing::debug!(err = %self, "rejected request");

        let status = match self {
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        };
        (status, "failed").into_response()
    }
}

/// An outbound count notification failed.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Option combinations that cannot run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("window length must be greater than zero")]
    ZeroWindow,

    #[error("drain grace {grace:?} must be shorter than the window {window:?}")]
    DrainGraceTooLong { grace: Duration, window: Duration },

    #[error("{option} requires the `{feature}` feature, which this build does not include")]
    Unsupported {
        option: &'static str,
        feature: &'static str,
    },
}

/// Errors that stop the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not open membership store: {0}")]
    Store(#[from] StoreError),

    #[error("could not create report sink: {0}")]
    Sink(#[from] SinkError),

    #[error("could not build notification client: {0}")]
    Notify(#[from] NotifyError),

    #[error("could not initialise logging: {0}")]
    Logging(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
