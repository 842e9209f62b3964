//! HTTP probe implementation.

use std::time::{Duration, Instant};
use super::ProbeError;

/// Status code and latency of a completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub elapsed: Duration,
}

/// Build the client used for probing. Redirects are followed.
pub fn build_probe_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ProbeError::Config(e.to_string()))
}

/// Run a HEAD probe against the given URL.
///
/// Only `http` and `https` URLs are accepted.
pub async fn run_http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<ProbeResponse, ProbeError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ProbeError::Config(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProbeError::Config(format!("unsupported scheme: {}", parsed.scheme())));
    }

    let start = Instant::now();

    let response = client
        .head(parsed)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else if e.is_builder() {
                ProbeError::Config(e.to_string())
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

    Ok(ProbeResponse {
        status_code: response.status().as_u16(),
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{refused_addr, serve};
    use axum::{http::StatusCode, response::Redirect, routing::get, Router};

    fn client(timeout: Duration) -> reqwest::Client {
        build_probe_client(timeout).unwrap()
    }

    #[tokio::test]
    async fn test_http_probe_reports_status_code() {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let addr = serve(router).await;
        let timeout = Duration::from_secs(5);

        let ok = run_http_probe(&client(timeout), &format!("http://{}/ok", addr), timeout).await;
        assert_eq!(ok.unwrap().status_code, 200);

        let missing = run_http_probe(&client(timeout), &format!("http://{}/missing", addr), timeout).await;
        assert_eq!(missing.unwrap().status_code, 404);

        let broken = run_http_probe(&client(timeout), &format!("http://{}/broken", addr), timeout).await;
        assert_eq!(broken.unwrap().status_code, 500);
    }

    #[tokio::test]
    async fn test_http_probe_follows_redirects() {
        let router = Router::new()
            .route("/old", get(|| async { Redirect::permanent("/new") }))
            .route("/new", get(|| async { "moved" }));
        let addr = serve(router).await;
        let timeout = Duration::from_secs(5);

        let result = run_http_probe(&client(timeout), &format!("http://{}/old", addr), timeout).await;
        assert_eq!(result.unwrap().status_code, 200);
    }

    #[tokio::test]
    async fn test_http_probe_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(router).await;
        let timeout = Duration::from_millis(200);

        let result = run_http_probe(&client(timeout), &format!("http://{}/slow", addr), timeout).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let addr = refused_addr().await;
        let timeout = Duration::from_secs(2);

        let result = run_http_probe(&client(timeout), &format!("http://{}/", addr), timeout).await;
        assert!(matches!(result, Err(ProbeError::Network(_))));
    }

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let timeout = Duration::from_millis(100);
        let result = run_http_probe(&client(timeout), "not a url", timeout).await;
        assert!(matches!(result, Err(ProbeError::Config(_))));

        let result = run_http_probe(&client(timeout), "ftp://example.com/file", timeout).await;
        assert!(matches!(result, Err(ProbeError::Config(_))));
    }
}
