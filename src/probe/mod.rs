//! Probe module for web endpoint monitoring.
//!
//! Issues a HEAD request per target and classifies the outcome.

mod http;

pub use http::*;

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::db::SiteStatus;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Classified result of probing one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: SiteStatus,
    pub status_code: Option<u16>,
    pub elapsed_ms: i64,
}

/// Map a probe result onto a site status.
///
/// Any response below 500 from 200 upwards means the endpoint is reachable,
/// so redirects and client errors count as UP.
pub fn classify(result: &Result<ProbeResponse, ProbeError>) -> SiteStatus {
    match result {
        Ok(resp) if (200..500).contains(&resp.status_code) => SiteStatus::Up,
        Ok(_) => SiteStatus::Down,
        Err(ProbeError::Timeout(_)) => SiteStatus::Timeout,
        Err(ProbeError::Network(_)) => SiteStatus::Down,
        Err(ProbeError::Config(_)) => SiteStatus::Error,
    }
}

/// HTTP prober shared by every probe of a tick.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_probe_client(timeout)?,
            timeout,
        })
    }

    /// Probe one URL. Never fails; failures become a status.
    pub async fn check(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();
        let result = run_http_probe(&self.client, url, self.timeout).await;
        let status = classify(&result);

        let (status_code, elapsed) = match &result {
            Ok(resp) => (Some(resp.status_code), resp.elapsed),
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", url, e);
                (None, start.elapsed())
            }
        };

        ProbeOutcome {
            status,
            status_code,
            elapsed_ms: elapsed.as_millis() as i64,
        }
    }
}
