//! Configuration module for vigil.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Messaging credentials are not part of it; they live in the store.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "vigil.db")
    pub db_path: String,
    /// Time between scheduled ticks (default: 60s)
    pub tick_interval: Duration,
    /// Deadline for the probe and watchdog work of one tick (default: 50s)
    pub tick_budget: Duration,
    /// Per-request probe timeout (default: 15s)
    pub probe_timeout: Duration,
    /// Number of targets probed concurrently (default: 10)
    pub probe_batch_size: usize,
    /// Minimum gap between repeated "site down" notifications (default: 3600s)
    pub site_renotify_interval: Duration,
    /// Minimum gap between repeated "node offline" notifications (default: 3600s)
    pub node_renotify_interval: Duration,
    /// Base URL of the Telegram Bot API
    pub telegram_api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "vigil.db".to_string(),
            tick_interval: Duration::from_secs(60),
            tick_budget: Duration::from_secs(50),
            probe_timeout: Duration::from_secs(15),
            probe_batch_size: 10,
            site_renotify_interval: Duration::from_secs(3600),
            node_renotify_interval: Duration::from_secs(3600),
            telegram_api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `VIGIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `VIGIL_DB_PATH`: Database file path (default: "vigil.db")
    /// - `VIGIL_TICK_INTERVAL_SECS`, `VIGIL_TICK_BUDGET_SECS`
    /// - `VIGIL_PROBE_TIMEOUT_SECS`, `VIGIL_PROBE_BATCH_SIZE`
    /// - `VIGIL_SITE_RENOTIFY_SECS`, `VIGIL_NODE_RENOTIFY_SECS`
    /// - `VIGIL_TELEGRAM_API_BASE`
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| parse_value::<u64>(&v));

        if let Some(port) = lookup("VIGIL_HTTP_PORT").and_then(|v| parse_value(&v)) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("VIGIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = parsed("VIGIL_TICK_INTERVAL_SECS") {
            cfg.tick_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(secs) = parsed("VIGIL_TICK_BUDGET_SECS") {
            cfg.tick_budget = Duration::from_secs(secs.max(1));
        }

        if let Some(secs) = parsed("VIGIL_PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(size) = parsed("VIGIL_PROBE_BATCH_SIZE") {
            cfg.probe_batch_size = (size as usize).max(1);
        }

        if let Some(secs) = parsed("VIGIL_SITE_RENOTIFY_SECS") {
            cfg.site_renotify_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parsed("VIGIL_NODE_RENOTIFY_SECS") {
            cfg.node_renotify_interval = Duration::from_secs(secs);
        }

        if let Some(base) = lookup("VIGIL_TELEGRAM_API_BASE") {
            cfg.telegram_api_base = base.trim_end_matches('/').to_string();
        }

        cfg
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "vigil.db");
        assert_eq!(cfg.probe_timeout, Duration::from_secs(15));
        assert_eq!(cfg.probe_batch_size, 10);
        assert_eq!(cfg.site_renotify_interval, Duration::from_secs(3600));
        assert_eq!(cfg.node_renotify_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = [
            ("VIGIL_HTTP_PORT", "not-a-port"),
            ("VIGIL_DB_PATH", "/tmp/vigil.db"),
            ("VIGIL_PROBE_BATCH_SIZE", "0"),
            ("VIGIL_NODE_RENOTIFY_SECS", "900"),
            ("VIGIL_TELEGRAM_API_BASE", "http://127.0.0.1:9000/"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "/tmp/vigil.db");
        assert_eq!(cfg.probe_batch_size, 1);
        assert_eq!(cfg.node_renotify_interval, Duration::from_secs(900));
        assert_eq!(cfg.site_renotify_interval, Duration::from_secs(3600));
        assert_eq!(cfg.telegram_api_base, "http://127.0.0.1:9000");
    }
}
