use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::QueryRejection;
use axum::routing::get;
use dedup_window::Id;
use serde::Deserialize;
use tower::ServiceExt;

use crate::error::IngressError;
use crate::service::ObserveService;
use crate::service::Observation;

pub const ACCEPT_PATH: &str = "/api/verve/accept";

#[derive(Debug, Deserialize)]
struct AcceptParams {
    id: Id,
    #[serde(default)]
    endpoint: Option<String>,
}

/// Builds the HTTP surface around `service`.
pub fn router(service: ObserveService) -> Router {
    Router::new()
        .route(ACCEPT_PATH, get(accept))
        .with_state(service)
}

async fn accept(
    State(service): State<ObserveService>,
    query: Result<Query<AcceptParams>, QueryRejection>,
) -> Result<&'static str, IngressError> {
    let Query(params) = query?;
    let observation = Observation {
        id: params.id,
        endpoint: params.endpoint.filter(|endpoint| !endpoint.is_empty()),
    };

    let Ok(outcome) = service.oneshot(observation).await;
    tracing::debug!(id = params.id, ?outcome, "accepted");

    Ok("ok")
}
