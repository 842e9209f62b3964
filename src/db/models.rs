//! Database model types.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observed status of a monitored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    /// Registered but never probed.
    #[default]
    Pending,
    Up,
    Down,
    Timeout,
    Error,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Pending => "PENDING",
            SiteStatus::Up => "UP",
            SiteStatus::Down => "DOWN",
            SiteStatus::Timeout => "TIMEOUT",
            SiteStatus::Error => "ERROR",
        }
    }

    /// DOWN, TIMEOUT and ERROR are grouped together for notifications.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, SiteStatus::Down | SiteStatus::Timeout | SiteStatus::Error)
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SiteStatus::Pending),
            "UP" => Ok(SiteStatus::Up),
            "DOWN" => Ok(SiteStatus::Down),
            "TIMEOUT" => Ok(SiteStatus::Timeout),
            "ERROR" => Ok(SiteStatus::Error),
            other => Err(format!("unknown site status: {}", other)),
        }
    }
}

impl ToSql for SiteStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SiteStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// The two manually ordered collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Sites,
    Servers,
}

impl Collection {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Collection::Sites => "monitored_sites",
            Collection::Servers => "servers",
        }
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sites" => Ok(Collection::Sites),
            "servers" => Ok(Collection::Servers),
            other => Err(format!("unknown collection: {}", other)),
        }
    }
}

/// A web endpoint polled by the probe scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub added_at: DateTime<Utc>,
    pub sort_order: Option<i64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_status: SiteStatus,
    pub last_status_code: Option<u16>,
    pub last_response_time_ms: Option<i64>,
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            id: 0,
            url: String::new(),
            name: String::new(),
            added_at: Utc::now(),
            sort_order: None,
            last_checked: None,
            last_status: SiteStatus::Pending,
            last_status_code: None,
            last_response_time_ms: None,
            last_notified_down_at: None,
        }
    }
}

impl Target {
    /// Name used in notifications, falling back to the URL.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

/// Outcome of one probe, written together with its history row.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub site_id: i64,
    pub checked_at: DateTime<Utc>,
    pub status: SiteStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<i64>,
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

/// A self-reporting compute node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub sort_order: Option<i64>,
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            api_key: String::new(),
            created_at: Utc::now(),
            sort_order: None,
            last_notified_down_at: None,
        }
    }
}

/// A node together with the time of its latest report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeLiveness {
    pub id: i64,
    pub name: String,
    pub sort_order: Option<i64>,
    pub last_notified_down_at: Option<DateTime<Utc>>,
    pub last_report: Option<DateTime<Utc>>,
}

impl NodeLiveness {
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Latest metrics pushed by a node. Replaced wholesale on every report.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,
    pub cpu: serde_json::Value,
    pub memory: serde_json::Value,
    pub disk: serde_json::Value,
    pub network: serde_json::Value,
}

/// One row of the site status series.
#[derive(Debug, Clone, Serialize)]
pub struct SiteHistoryRecord {
    pub site_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: SiteStatus,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<i64>,
}

/// One row of the node utilisation series.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHistoryRecord {
    pub server_id: i64,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

/// Rows removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub site_rows: usize,
    pub node_rows: usize,
}

/// Messaging endpoint settings, stored in a single row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub enabled: bool,
}

impl NotifierConfig {
    /// Enabled and fully configured.
    pub fn is_active(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        self.enabled && set(&self.bot_token) && set(&self.chat_id)
    }
}

/// Just the fields the ordering logic needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankEntry {
    pub id: i64,
    pub name: String,
    pub sort_order: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_grouping() {
        for s in ["PENDING", "UP", "DOWN", "TIMEOUT", "ERROR"] {
            assert_eq!(s.parse::<SiteStatus>().unwrap().as_str(), s);
        }
        assert!("up".parse::<SiteStatus>().is_err());

        assert!(!SiteStatus::Pending.is_unhealthy());
        assert!(!SiteStatus::Up.is_unhealthy());
        assert!(SiteStatus::Down.is_unhealthy());
        assert!(SiteStatus::Timeout.is_unhealthy());
        assert!(SiteStatus::Error.is_unhealthy());
    }

    #[test]
    fn test_notifier_config_active() {
        let mut cfg = NotifierConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: Some("42".to_string()),
            enabled: true,
        };
        assert!(cfg.is_active());

        cfg.chat_id = Some(String::new());
        assert!(!cfg.is_active());

        cfg.chat_id = Some("42".to_string());
        cfg.enabled = false;
        assert!(!cfg.is_active());
    }

    #[test]
    fn test_display_name_fallback() {
        let target = Target {
            url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(target.display_name(), "https://example.com");
    }
}
