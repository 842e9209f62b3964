//! SQLite database store implementation.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

/// Length of the access token issued to each node.
const API_KEY_LEN: usize = 32;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Targets ---

    /// Register a new target in PENDING state at the end of the manual order.
    pub fn add_target(&self, target: &mut Target) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        let sort_order = next_sort_order(&conn, Collection::Sites)?;

        conn.execute(
            "INSERT INTO monitored_sites (url, name, added_at, sort_order, last_status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                target.url,
                target.name,
                to_db_time(target.added_at),
                sort_order,
                SiteStatus::Pending,
            ],
        )
        .map_err(|e| map_constraint(e, format!("url already monitored: {}", target.url)))?;

        target.id = conn.last_insert_rowid();
        target.sort_order = Some(sort_order);
        target.last_status = SiteStatus::Pending;
        Ok(target.id)
    }

    /// Get all targets in display order.
    pub fn get_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM monitored_sites ORDER BY sort_order ASC NULLS LAST, name ASC, id ASC",
            TARGET_COLUMNS
        ))?;

        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<Target, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM monitored_sites WHERE id = ?1", TARGET_COLUMNS),
            params![id],
            target_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a target. History rows go with it.
    pub fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changes = conn.execute("DELETE FROM monitored_sites WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Persist a probe outcome: current state and a history row, atomically.
    pub fn record_check(&self, check: &CheckRecord) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        let changes = tx.execute(
            "UPDATE monitored_sites SET last_checked = ?1, last_status = ?2, last_status_code = ?3,
             last_response_time_ms = ?4, last_notified_down_at = ?5 WHERE id = ?6",
            params![
                to_db_time(check.checked_at),
                check.status,
                check.status_code,
                check.response_time_ms,
                check.last_notified_down_at.map(to_db_time),
                check.site_id,
            ],
        )?;
        if changes == 0 {
            return Err(DbError::NotFound);
        }

        tx.execute(
            "INSERT INTO site_status_history (site_id, timestamp, status, status_code, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                check.site_id,
                to_db_time(check.checked_at),
                check.status,
                check.status_code,
                check.response_time_ms,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Get the status history of a site since the given time, oldest first.
    pub fn get_site_history(
        &self,
        site_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<SiteHistoryRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT site_id, timestamp, status, status_code, response_time_ms FROM site_status_history
             WHERE site_id = ?1 AND timestamp >= ?2 ORDER BY timestamp ASC",
        )?;

        let records = stmt
            .query_map(params![site_id, to_db_time(since)], |row| {
                Ok(SiteHistoryRecord {
                    site_id: row.get(0)?,
                    timestamp: from_db_time(row.get(1)?),
                    status: row.get(2)?,
                    status_code: row.get(3)?,
                    response_time_ms: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    // --- Nodes ---

    /// Register a node and issue its access token.
    pub fn add_node(&self, node: &mut Node) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        let sort_order = next_sort_order(&conn, Collection::Servers)?;
        let api_key = generate_api_key();

        conn.execute(
            "INSERT INTO servers (name, description, api_key, created_at, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.name,
                node.description,
                api_key,
                to_db_time(node.created_at),
                sort_order,
            ],
        )
        .map_err(|e| map_constraint(e, "api key collision".to_string()))?;

        node.id = conn.last_insert_rowid();
        node.api_key = api_key;
        node.sort_order = Some(sort_order);
        Ok(node.id)
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: i64) -> Result<Node, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM servers WHERE id = ?1", NODE_COLUMNS),
            params![id],
            node_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a node together with its snapshot and history.
    pub fn delete_node(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changes = conn.execute("DELETE FROM servers WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Every node with the timestamp of its latest report, in display order.
    pub fn get_node_liveness(&self) -> Result<Vec<NodeLiveness>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.sort_order, s.last_notified_down_at, m.timestamp
             FROM servers s LEFT JOIN metrics m ON s.id = m.server_id
             ORDER BY s.sort_order ASC NULLS LAST, s.name ASC, s.id ASC",
        )?;

        let nodes = stmt
            .query_map([], |row| {
                Ok(NodeLiveness {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sort_order: row.get(2)?,
                    last_notified_down_at: row.get::<_, Option<i64>>(3)?.map(from_db_time),
                    last_report: row.get::<_, Option<i64>>(4)?.map(from_db_time),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(nodes)
    }

    /// Set or clear the node's last down-notification time.
    pub fn set_node_notified_down(
        &self,
        id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changes = conn.execute(
            "UPDATE servers SET last_notified_down_at = ?1 WHERE id = ?2",
            params![at.map(to_db_time), id],
        )?;
        if changes == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Metrics ---

    /// Replace the node's snapshot and, when utilisation figures are present,
    /// append a history row. Both writes commit together.
    pub fn save_report(
        &self,
        snapshot: &MetricsSnapshot,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let ts = to_db_time(snapshot.timestamp);

        tx.execute(
            "REPLACE INTO metrics (server_id, timestamp, cpu, memory, disk, network) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.server_id,
                ts,
                snapshot.cpu.to_string(),
                snapshot.memory.to_string(),
                snapshot.disk.to_string(),
                snapshot.network.to_string(),
            ],
        )?;

        if cpu_percent.is_some() || memory_percent.is_some() {
            tx.execute(
                "INSERT INTO server_metrics_history (server_id, timestamp, cpu_percent, memory_percent) VALUES (?1, ?2, ?3, ?4)",
                params![snapshot.server_id, ts, cpu_percent, memory_percent],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get the latest snapshot reported by a node, if any.
    pub fn get_metrics(&self, server_id: i64) -> Result<Option<MetricsSnapshot>, DbError> {
        let conn = self.conn.lock().unwrap();
        let snapshot = conn
            .query_row(
                "SELECT server_id, timestamp, cpu, memory, disk, network FROM metrics WHERE server_id = ?1",
                params![server_id],
                |row| {
                    Ok(MetricsSnapshot {
                        server_id: row.get(0)?,
                        timestamp: from_db_time(row.get(1)?),
                        cpu: parse_json(row.get(2)?),
                        memory: parse_json(row.get(3)?),
                        disk: parse_json(row.get(4)?),
                        network: parse_json(row.get(5)?),
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Get the utilisation history of a node since the given time, oldest first.
    pub fn get_node_history(
        &self,
        server_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<NodeHistoryRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT server_id, timestamp, cpu_percent, memory_percent FROM server_metrics_history
             WHERE server_id = ?1 AND timestamp >= ?2 ORDER BY timestamp ASC",
        )?;

        let records = stmt
            .query_map(params![server_id, to_db_time(since)], |row| {
                Ok(NodeHistoryRecord {
                    server_id: row.get(0)?,
                    timestamp: from_db_time(row.get(1)?),
                    cpu_percent: row.get(2)?,
                    memory_percent: row.get(3)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    // --- Ordering ---

    /// Id, name and rank of every row in a collection, unordered.
    pub fn get_rank_entries(&self, collection: Collection) -> Result<Vec<RankEntry>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, sort_order FROM {}",
            collection.table()
        ))?;

        let entries = stmt
            .query_map([], |row| {
                Ok(RankEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sort_order: row.get(2)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(entries)
    }

    /// Write `(id, rank)` pairs in one transaction.
    pub fn set_ranks(&self, collection: Collection, ranks: &[(i64, i64)]) -> Result<(), DbError> {
        if ranks.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET sort_order = ?1 WHERE id = ?2",
                collection.table()
            ))?;

            for (id, rank) in ranks {
                stmt.execute(params![rank, id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    // --- Retention ---

    /// Delete history rows of both series older than `cutoff`.
    pub fn prune_history_before(&self, cutoff: DateTime<Utc>) -> Result<PruneStats, DbError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let cutoff = to_db_time(cutoff);

        let site_rows = tx.execute(
            "DELETE FROM site_status_history WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let node_rows = tx.execute(
            "DELETE FROM server_metrics_history WHERE timestamp < ?1",
            params![cutoff],
        )?;

        tx.commit()?;
        Ok(PruneStats {
            site_rows,
            node_rows,
        })
    }

    // --- Notifier settings ---

    pub fn get_notifier_config(&self) -> Result<NotifierConfig, DbError> {
        let conn = self.conn.lock().unwrap();
        let config = conn
            .query_row(
                "SELECT bot_token, chat_id, enabled FROM notifier_config WHERE id = 1",
                [],
                |row| {
                    Ok(NotifierConfig {
                        bot_token: row.get(0)?,
                        chat_id: row.get(1)?,
                        enabled: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(config.unwrap_or_default())
    }

    pub fn update_notifier_config(&self, config: &NotifierConfig) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notifier_config (id, bot_token, chat_id, enabled, updated_at) VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET bot_token = excluded.bot_token, chat_id = excluded.chat_id,
             enabled = excluded.enabled, updated_at = excluded.updated_at",
            params![
                config.bot_token,
                config.chat_id,
                config.enabled,
                to_db_time(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

const TARGET_COLUMNS: &str = "id, url, name, added_at, sort_order, last_checked, last_status, \
     last_status_code, last_response_time_ms, last_notified_down_at";

const NODE_COLUMNS: &str =
    "id, name, description, api_key, created_at, sort_order, last_notified_down_at";

fn target_from_row(row: &Row<'_>) -> SqlResult<Target> {
    Ok(Target {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        added_at: from_db_time(row.get(3)?),
        sort_order: row.get(4)?,
        last_checked: row.get::<_, Option<i64>>(5)?.map(from_db_time),
        last_status: row.get(6)?,
        last_status_code: row.get(7)?,
        last_response_time_ms: row.get(8)?,
        last_notified_down_at: row.get::<_, Option<i64>>(9)?.map(from_db_time),
    })
}

fn node_from_row(row: &Row<'_>) -> SqlResult<Node> {
    Ok(Node {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        api_key: row.get(3)?,
        created_at: from_db_time(row.get(4)?),
        sort_order: row.get(5)?,
        last_notified_down_at: row.get::<_, Option<i64>>(6)?.map(from_db_time),
    })
}

fn next_sort_order(conn: &Connection, collection: Collection) -> Result<i64, DbError> {
    let max: Option<i64> = conn.query_row(
        &format!("SELECT MAX(sort_order) FROM {}", collection.table()),
        [],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |m| m + 1))
}

fn map_constraint(err: rusqlite::Error, what: String) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            DbError::Conflict(what)
        }
        _ => DbError::Sqlite(err),
    }
}

fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

fn parse_json(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null)
}

/// Timestamps are stored as Unix seconds.
fn to_db_time(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_db_time(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
