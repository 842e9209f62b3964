//! Liveness watchdog for self-reporting nodes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use super::debounce;
use crate::db::{NodeLiveness, Store};
use crate::notify::{Dispatcher, Notification};

/// A node is stale once its last report is older than this.
pub const STALE_AFTER_SECS: i64 = 300;

/// Counts for one watchdog pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogSummary {
    pub checked: usize,
    pub stale: usize,
    pub failed: usize,
    /// Notifier inactive, nothing was evaluated.
    pub skipped: bool,
}

/// No report ever, or the last one is past the freshness threshold.
pub fn is_stale(last_report: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_report.map_or(true, |at| now - at > ChronoDuration::seconds(STALE_AFTER_SECS))
}

/// Evaluate every node's freshness and alert on transitions.
///
/// A node carries no stored status: a set `last_notified_down_at` means it
/// was stale on the previous pass. The pass is skipped while notifications
/// are inactive.
pub fn check_nodes(
    store: &Store,
    dispatcher: &Dispatcher,
    now: DateTime<Utc>,
    renotify_interval: Duration,
) -> WatchdogSummary {
    let mut summary = WatchdogSummary::default();

    match store.get_notifier_config() {
        Ok(cfg) if cfg.is_active() => {}
        Ok(_) => {
            summary.skipped = true;
            return summary;
        }
        Err(e) => {
            tracing::error!("Watchdog: Failed to read notifier settings: {}", e);
            summary.skipped = true;
            return summary;
        }
    }

    let nodes = match store.get_node_liveness() {
        Ok(n) => n,
        Err(e) => {
            tracing::error!("Watchdog: Failed to get nodes: {}", e);
            return summary;
        }
    };

    for node in nodes {
        summary.checked += 1;
        let stale = is_stale(node.last_report, now);
        if stale {
            summary.stale += 1;
        }

        if let Err(e) = check_node(store, dispatcher, &node, stale, now, renotify_interval) {
            summary.failed += 1;
            tracing::error!("Watchdog: Failed to update {}: {}", node.display_name(), e);
        }
    }

    summary
}

fn check_node(
    store: &Store,
    dispatcher: &Dispatcher,
    node: &NodeLiveness,
    stale: bool,
    now: DateTime<Utc>,
    renotify_interval: Duration,
) -> Result<(), crate::db::DbError> {
    let decision = debounce::evaluate(
        node.last_notified_down_at.is_some(),
        stale,
        node.last_notified_down_at,
        now,
        renotify_interval,
    );

    let Some(alert) = decision.alert else {
        return Ok(());
    };

    let written = store.set_node_notified_down(node.id, decision.last_notified_down_at);
    dispatcher.dispatch(Notification::node(alert, node));
    written
}
