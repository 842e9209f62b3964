//! Ingestion of metrics pushed by nodes.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::db::{MetricsSnapshot, Store};
use crate::error::Error;

/// Body of a node's report. Every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsReport {
    /// Unix seconds, as measured by the node.
    pub timestamp: Option<i64>,
    pub cpu: Option<Value>,
    pub memory: Option<Value>,
    pub disk: Option<Value>,
    pub network: Option<Value>,
}

fn required(field: Option<Value>, name: &str) -> Result<Value, Error> {
    match field {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(Error::InvalidInput(format!("missing field: {}", name))),
    }
}

fn usage_percent(section: &Value) -> Option<f64> {
    section.get("usage_percent").and_then(Value::as_f64)
}

/// Validate `token` against the node's issued key and store the report.
///
/// Nothing is written unless the node exists, the token matches and the
/// payload is complete.
pub fn ingest(store: &Store, node_id: i64, token: &str, report: MetricsReport) -> Result<(), Error> {
    if token.is_empty() {
        return Err(Error::Unauthorized);
    }

    let node = store.get_node(node_id)?;
    if node.api_key != token {
        tracing::warn!("Rejected report for node {}: invalid token", node_id);
        return Err(Error::Unauthorized);
    }

    let timestamp = report
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .ok_or_else(|| Error::InvalidInput("missing field: timestamp".to_string()))?;

    let snapshot = MetricsSnapshot {
        server_id: node_id,
        timestamp,
        cpu: required(report.cpu, "cpu")?,
        memory: required(report.memory, "memory")?,
        disk: required(report.disk, "disk")?,
        network: required(report.network, "network")?,
    };

    let cpu_percent = usage_percent(&snapshot.cpu);
    let memory_percent = usage_percent(&snapshot.memory);
    store.save_report(&snapshot, cpu_percent, memory_percent)?;

    Ok(())
}
