//! In-process stand-ins for the discovery directory and the factorize
//! service, bound to ephemeral localhost ports.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use factorbench_core::{
    factor::{parse_number, prime_factors},
    types::{ErrorResponse, FACTORIZE_PATH, FactorizeResponse},
};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral port and returns its `host:port`.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}

/// A `host:port` with nothing listening on it.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// A discovery directory answering every catalog lookup with `body`.
pub async fn spawn_catalog(status: StatusCode, body: impl Into<String>) -> String {
    let body: String = body.into();
    let router = Router::new().route(
        "/v1/catalog/service/{service}",
        get(move || async move {
            (
                status,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                body,
            )
        }),
    );
    serve(router).await
}

/// A directory whose catalog lists exactly `backend`.
pub async fn spawn_catalog_for(backend: &str) -> String {
    let (host, port) = backend.rsplit_once(':').unwrap();
    let body = format!(r#"[{{"ServiceAddress":"{host}","ServicePort":{port}}}]"#);
    spawn_catalog(StatusCode::OK, body).await
}

/// Factorize stub that records every number it was asked about.
#[derive(Debug, Clone)]
pub struct Backend {
    pub addr: String,
    seen: Arc<Mutex<Vec<i64>>>,
}

impl Backend {
    pub fn seen(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }
}

#[derive(Debug, Deserialize)]
struct FactorizeQuery {
    number: Option<String>,
}

/// Spawns a factorize service with the production request semantics:
/// `400` for anything below 2, the prime factors otherwise.
pub async fn spawn_backend() -> Backend {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route(FACTORIZE_PATH, get(factorize))
        .with_state(seen.clone());
    Backend {
        addr: serve(router).await,
        seen,
    }
}

async fn factorize(
    State(seen): State<Arc<Mutex<Vec<i64>>>>,
    Query(query): Query<FactorizeQuery>,
) -> Response {
    if let Some(number) = query.number.as_deref().and_then(|raw| raw.parse().ok()) {
        seen.lock().unwrap().push(number);
    }
    match parse_number(query.number.as_deref()) {
        Ok(n) => Json(FactorizeResponse {
            factors: prime_factors(n),
        })
        .into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}
