//! HTTP handlers for the factorize service.
//!
//! ## Routes
//!
//! - `GET /factorize?number=n` - prime factors of `n`, smallest first.
//! - `GET /metrics` - Prometheus text exposition of [`ServerMetrics`].
//! - `GET /healthz` - liveness probe.
//!
//! Only the factorize route is wrapped by [`track_factorize`], so scrapes and
//! probes never show up in the connection gauge or the latency histogram.

use crate::server::metrics::ServerMetrics;
use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use factorbench_core::{
    Error,
    factor::{parse_number, prime_factors},
    types::{ErrorResponse, FACTORIZE_PATH, FactorizeResponse, HEALTH_PATH, METRICS_PATH},
};
use serde::Deserialize;

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    Invalid(Error),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Invalid(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Invalid(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Internal(reason) => (StatusCode::INTERNAL_SERVER_ERROR, reason),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct FactorizeQuery {
    number: Option<String>,
}

/// Builds the service router around an injected [`ServerMetrics`].
pub fn router(metrics: ServerMetrics) -> Router {
    let factorize_routes = Router::new()
        .route(FACTORIZE_PATH, get(factorize))
        .route_layer(middleware::from_fn_with_state(
            metrics.clone(),
            track_factorize,
        ));

    Router::new()
        .merge(factorize_routes)
        .route(METRICS_PATH, get(render_metrics))
        .route(HEALTH_PATH, get(|| async { "ok" }))
        .with_state(metrics)
}

/// Counts the request as active for its whole lifetime and records its
/// duration once a response has been produced.
async fn track_factorize(
    State(metrics): State<ServerMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let guard = metrics.track();
    let response = next.run(request).await;
    guard.complete(response.status());
    response
}

#[tracing::instrument(skip_all, fields(number = ?query.number))]
async fn factorize(
    Query(query): Query<FactorizeQuery>,
) -> Result<Json<FactorizeResponse>, ApiError> {
    let number = parse_number(query.number.as_deref()).inspect_err(|err| {
        tracing::debug!("Rejected factorize request: {err}");
    })?;

    // Trial division is CPU-bound; keep it off the async workers.
    let factors = tokio::task::spawn_blocking(move || prime_factors(number))
        .await
        .map_err(|err| ApiError::Internal(format!("factorization task failed: {err}")))?;

    Ok(Json(FactorizeResponse { factors }))
}

async fn render_metrics(State(metrics): State<ServerMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to encode metrics: {err}");
            ApiError::Internal(err.to_string()).into_response()
        }
    }
}
