//! HTTP control surface of the driver.
//!
//! ## Routes
//!
//! - `GET /start?n=&seed=&t=` - executes one run and replies with its summary.
//!   `n` is the per-worker request count, `seed` the base seed and `t` the
//!   worker count. Missing or unparsable values count as 0, which means "the
//!   configured default" for `seed` and `t` and "one pass" for `n`.
//! - `GET /healthz` - liveness probe.
//!
//! Both outcomes of `/start` are answered with `200`; the body tells them
//! apart. A run stops early when its client disconnects or when the server's
//! shutdown token fires.

use crate::{
    config::RunParams,
    coordinator::{Coordinator, RunResult, RunSummary},
    error::RunError,
};
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use factorbench_core::types::HEALTH_PATH;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

pub const START_PATH: &str = "/start";
pub const FINISHED_MESSAGE: &str = "Finish factorization";

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    n: Option<String>,
    seed: Option<String>,
    t: Option<String>,
}

impl StartQuery {
    fn params(&self) -> RunParams {
        RunParams::from_raw(
            lenient(self.n.as_deref()),
            lenient(self.seed.as_deref()),
            lenient(self.t.as_deref()),
        )
    }
}

fn lenient<T: FromStr + Default>(raw: Option<&str>) -> T {
    raw.and_then(|raw| raw.trim().parse().ok())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StartResponse {
    Finished {
        message: &'static str,
        summary: RunSummary,
    },
    Failed {
        error: String,
    },
}

impl From<Result<RunResult, RunError>> for StartResponse {
    fn from(result: Result<RunResult, RunError>) -> Self {
        match result {
            Ok(result) => Self::Finished {
                message: FINISHED_MESSAGE,
                summary: result.summary(),
            },
            Err(err) => Self::Failed {
                error: format!("Error: {err}"),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlState {
    coordinator: Coordinator,
    shutdown: CancellationToken,
}

/// Every run started through the router is a child of `shutdown`.
pub fn router(coordinator: Coordinator, shutdown: CancellationToken) -> Router {
    Router::new()
        .route(START_PATH, get(start))
        .route(HEALTH_PATH, get(|| async { "ok" }))
        .with_state(ControlState {
            coordinator,
            shutdown,
        })
}

#[tracing::instrument(skip_all)]
async fn start(
    State(ControlState {
        coordinator,
        shutdown,
    }): State<ControlState>,
    Query(query): Query<StartQuery>,
) -> Json<StartResponse> {
    let params = query.params();
    let token = shutdown.child_token();
    // Cancels the run if this handler is dropped, e.g. the client went away.
    let _guard = token.clone().drop_guard();

    let run = tokio::spawn(async move {
        coordinator
            .start(&params, &token)
            .await
            .and_then(RunResult::into_result)
    });

    let response = match run.await {
        Ok(result) => StartResponse::from(result),
        Err(err) => StartResponse::Failed {
            error: format!("Error: run task failed: {err}"),
        },
    };
    match &response {
        StartResponse::Finished { summary, .. } => {
            tracing::info!(issued = summary.issued, "Run requested over HTTP finished")
        }
        StartResponse::Failed { error } => tracing::warn!("Run requested over HTTP failed: {error}"),
    }
    Json(response)
}
