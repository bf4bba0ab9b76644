use crate::error::RequestError;
use factorbench_core::types::{FACTORIZE_PATH, FactorList, FactorizeResponse};

/// One factorize round-trip against a resolved endpoint.
pub trait Factorizer: Send + Sync + 'static {
    fn factorize(
        &self,
        endpoint: &str,
        number: i64,
    ) -> impl Future<Output = Result<FactorList, RequestError>> + Send;
}

/// Calls `GET http://{endpoint}/factorize?number={n}`.
#[derive(Debug, Clone)]
pub struct HttpFactorizer {
    http: reqwest::Client,
}

impl HttpFactorizer {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Factorizer for HttpFactorizer {
    async fn factorize(&self, endpoint: &str, number: i64) -> Result<FactorList, RequestError> {
        let url = format!("http://{endpoint}{FACTORIZE_PATH}?number={number}");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(RequestError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(RequestError::Body)?;
        if !status.is_success() {
            return Err(RequestError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice::<FactorizeResponse>(&body)
            .map(|response| response.factors)
            .map_err(|err| RequestError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port, serve, spawn_backend};
    use axum::{Router, routing::get};

    #[tokio::test]
    async fn returns_factors_from_the_service() {
        let backend = spawn_backend().await;
        let factorizer = HttpFactorizer::new(reqwest::Client::new());

        assert_eq!(factorizer.factorize(&backend.addr, 360).await.unwrap(), vec![2, 2, 2, 3, 3, 5]);
        assert_eq!(backend.seen(), vec![360]);
    }

    #[tokio::test]
    async fn client_errors_are_status_failures() {
        let backend = spawn_backend().await;
        let factorizer = HttpFactorizer::new(reqwest::Client::new());

        let err = factorizer.factorize(&backend.addr, 1).await.unwrap_err();
        match err {
            RequestError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("valid number"), "{body}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_bodies_are_decode_failures() {
        let addr = serve(Router::new().route(FACTORIZE_PATH, get(|| async { "[2, 3]" }))).await;
        let factorizer = HttpFactorizer::new(reqwest::Client::new());

        let err = factorizer.factorize(&addr, 6).await.unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoints_are_transport_failures() {
        let factorizer = HttpFactorizer::new(reqwest::Client::new());
        let err = factorizer.factorize(&closed_port().await, 6).await.unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
