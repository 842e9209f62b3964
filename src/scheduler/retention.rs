//! Retention sweep for the history series.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::db::{PruneStats, Store};

/// History older than this is deleted.
pub const HISTORY_RETENTION_DAYS: i64 = 7;

/// Delete history rows of both series older than the retention window.
///
/// Returns `None` when the store rejected the sweep.
pub fn process_retention(store: &Store, now: DateTime<Utc>) -> Option<PruneStats> {
    let cutoff = now - ChronoDuration::days(HISTORY_RETENTION_DAYS);

    match store.prune_history_before(cutoff) {
        Ok(stats) => {
            if stats != PruneStats::default() {
                tracing::info!(
                    "Retention: Pruned {} site history rows, {} node history rows",
                    stats.site_rows,
                    stats.node_rows
                );
            }
            Some(stats)
        }
        Err(e) => {
            tracing::error!("Retention: Failed to prune history: {}", e);
            None
        }
    }
}
