//! Probe scheduler: checks every registered site in bounded batches.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use super::debounce;
use crate::db::{CheckRecord, DbError, SiteStatus, Store, Target};
use crate::notify::{Dispatcher, Notification};
use crate::probe::HttpProber;

/// Counts for one probe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub up: usize,
    pub unhealthy: usize,
    pub failed: usize,
}

/// Probe all sites, `batch_size` at a time. Each batch completes before the
/// next one starts.
pub async fn probe_sites(
    store: Arc<Store>,
    prober: HttpProber,
    dispatcher: Dispatcher,
    batch_size: usize,
    renotify_interval: Duration,
) -> ProbeSummary {
    let mut summary = ProbeSummary::default();

    let targets = match store.get_targets() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Scheduler: Failed to get targets: {}", e);
            return summary;
        }
    };

    for batch in targets.chunks(batch_size.max(1)) {
        let mut set = JoinSet::new();

        for target in batch.iter().cloned() {
            let store = store.clone();
            let prober = prober.clone();
            let dispatcher = dispatcher.clone();
            set.spawn(async move {
                let name = target.display_name().to_string();
                let result =
                    check_site(&store, &prober, &dispatcher, target, renotify_interval).await;
                (name, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(status))) if status.is_unhealthy() => summary.unhealthy += 1,
                Ok((_, Ok(_))) => summary.up += 1,
                Ok((name, Err(e))) => {
                    summary.failed += 1;
                    tracing::error!("Scheduler: Failed to record check for {}: {}", name, e);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!("Scheduler: Probe task failed: {}", e);
                }
            }
        }
    }

    summary
}

/// Probe one site, apply the transition rules and persist the outcome.
///
/// The notification is queued even when the write fails.
pub async fn check_site(
    store: &Store,
    prober: &HttpProber,
    dispatcher: &Dispatcher,
    target: Target,
    renotify_interval: Duration,
) -> Result<SiteStatus, DbError> {
    let outcome = prober.check(&target.url).await;
    let now = Utc::now();

    let decision = debounce::evaluate(
        target.last_status.is_unhealthy(),
        outcome.status.is_unhealthy(),
        target.last_notified_down_at,
        now,
        renotify_interval,
    );

    tracing::debug!(
        "Scheduler: {} {} -> {} ({:?}, {}ms)",
        target.display_name(),
        target.last_status,
        outcome.status,
        outcome.status_code,
        outcome.elapsed_ms
    );

    let written = store.record_check(&CheckRecord {
        site_id: target.id,
        checked_at: now,
        status: outcome.status,
        status_code: outcome.status_code,
        response_time_ms: Some(outcome.elapsed_ms),
        last_notified_down_at: decision.last_notified_down_at,
    });

    if let Some(alert) = decision.alert {
        dispatcher.dispatch(Notification::site(
            alert,
            &target,
            outcome.status,
            outcome.status_code,
        ));
    }

    written.map(|_| outcome.status)
}
