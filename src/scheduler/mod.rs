//! Scheduler module: the periodic monitoring tick.
//!
//! One tick probes every site and runs the node watchdog side by side, both
//! under the tick budget, then sweeps expired history.

mod debounce;
mod retention;
mod sites;
mod watchdog;

pub use retention::*;
pub use sites::*;
pub use watchdog::*;

use crate::config::ServerConfig;
use crate::db::{PruneStats, Store};
use crate::notify::Dispatcher;
use crate::probe::HttpProber;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Tick parameters taken from the server configuration.
#[derive(Debug, Clone)]
pub struct TickSettings {
    pub interval: Duration,
    pub budget: Duration,
    pub batch_size: usize,
    pub site_renotify_interval: Duration,
    pub node_renotify_interval: Duration,
}

impl From<&ServerConfig> for TickSettings {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            interval: cfg.tick_interval,
            budget: cfg.tick_budget,
            batch_size: cfg.probe_batch_size,
            site_renotify_interval: cfg.site_renotify_interval,
            node_renotify_interval: cfg.node_renotify_interval,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// `None` when the budget ran out before probing finished.
    pub sites: Option<ProbeSummary>,
    pub nodes: Option<WatchdogSummary>,
    pub pruned: Option<PruneStats>,
    pub timed_out: bool,
}

/// Drives the monitoring tick.
pub struct Scheduler {
    store: Arc<Store>,
    prober: HttpProber,
    dispatcher: Dispatcher,
    settings: TickSettings,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        prober: HttpProber,
        dispatcher: Dispatcher,
        settings: TickSettings,
    ) -> Self {
        Self {
            store,
            prober,
            dispatcher,
            settings,
            stop: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Run one tick. Per-item failures are logged and never abort the tick.
    pub async fn run_tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let probing = probe_sites(
            self.store.clone(),
            self.prober.clone(),
            self.dispatcher.clone(),
            self.settings.batch_size,
            self.settings.site_renotify_interval,
        );
        let watching = async {
            check_nodes(
                &self.store,
                &self.dispatcher,
                Utc::now(),
                self.settings.node_renotify_interval,
            )
        };

        match tokio::time::timeout(self.settings.budget, async { tokio::join!(probing, watching) })
            .await
        {
            Ok((sites, nodes)) => {
                summary.sites = Some(sites);
                summary.nodes = Some(nodes);
            }
            Err(_) => {
                // Dropping the probe pass aborts its in-flight probes.
                summary.timed_out = true;
                tracing::warn!(
                    "Scheduler: Tick exceeded budget of {:?}, unfinished probes abandoned",
                    self.settings.budget
                );
            }
        }

        summary.pruned = process_retention(&self.store, Utc::now());

        tracing::info!(
            "Scheduler: Tick done (sites: {:?}, nodes: {:?}, timed out: {})",
            summary.sites,
            summary.nodes,
            summary.timed_out
        );

        summary
    }

    /// Start the periodic tick loop.
    pub async fn start(self: &Arc<Self>) {
        let (tx, _) = broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            *stop_guard = Some(tx.clone());
        }

        let scheduler = self.clone();
        let mut rx = tx.subscribe();

        tracing::info!(
            "Scheduler: Ticking every {:?} (batch size {})",
            self.settings.interval,
            self.settings.batch_size
        );

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.settings.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        scheduler.run_tick().await;
                    }
                }
            }

            tracing::info!("Scheduler: Stopped");
        });
        *self.task.lock().await = Some(handle);
    }

    /// Stop the tick loop and wait for it to exit. A tick already running
    /// finishes first.
    pub async fn stop(&self) {
        {
            let stop = self.stop.lock().await;
            if let Some(tx) = stop.as_ref() {
                let _ = tx.send(());
            }
        }

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler: Tick loop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckRecord, SiteStatus, Target};
    use crate::notify::{Alert, Notification};
    use crate::testutil::{refused_addr, serve, temp_store};
    use axum::{http::StatusCode, routing::get, Router};
    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;

    fn settings() -> TickSettings {
        TickSettings {
            interval: Duration::from_secs(60),
            budget: Duration::from_secs(30),
            batch_size: 10,
            site_renotify_interval: Duration::from_secs(3600),
            node_renotify_interval: Duration::from_secs(3600),
        }
    }

    fn build_scheduler(
        store: Arc<Store>,
        probe_timeout: Duration,
        settings: TickSettings,
    ) -> (Scheduler, mpsc::Receiver<Notification>) {
        let prober = HttpProber::new(probe_timeout).unwrap();
        let (dispatcher, rx) = Dispatcher::channel();
        (Scheduler::new(store, prober, dispatcher, settings), rx)
    }

    fn add_site(store: &Store, url: String) -> i64 {
        let mut target = Target {
            url,
            ..Default::default()
        };
        store.add_target(&mut target).unwrap()
    }

    #[tokio::test]
    async fn test_tick_classifies_and_alerts() {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/fail", get(|| async { StatusCode::BAD_GATEWAY }));
        let addr = serve(router).await;
        let refused = refused_addr().await;

        let (_tmp, store) = temp_store();
        let ok = add_site(&store, format!("http://{}/ok", addr));
        let missing = add_site(&store, format!("http://{}/missing", addr));
        let failing = add_site(&store, format!("http://{}/fail", addr));
        let gone = add_site(&store, format!("http://{}/", refused));

        let store = Arc::new(store);
        let (scheduler, mut rx) = build_scheduler(store.clone(), Duration::from_secs(5), settings());

        let summary = scheduler.run_tick().await;
        assert!(!summary.timed_out);
        assert_eq!(
            summary.sites,
            Some(ProbeSummary { up: 2, unhealthy: 2, failed: 0 })
        );
        // notifier inactive, the watchdog stays out of it
        assert!(summary.nodes.unwrap().skipped);

        assert_eq!(store.get_target(ok).unwrap().last_status, SiteStatus::Up);
        assert_eq!(store.get_target(missing).unwrap().last_status, SiteStatus::Up);
        assert_eq!(store.get_target(failing).unwrap().last_status, SiteStatus::Down);
        assert_eq!(store.get_target(gone).unwrap().last_status, SiteStatus::Down);

        let mut alerts = Vec::new();
        while let Ok(n) = rx.try_recv() {
            alerts.push(n.alert);
        }
        assert_eq!(alerts, vec![Some(Alert::Down), Some(Alert::Down)]);

        // second tick: same states, no new alerts, never back to PENDING
        scheduler.run_tick().await;
        assert!(rx.try_recv().is_err());
        for id in [ok, missing, failing, gone] {
            assert_ne!(store.get_target(id).unwrap().last_status, SiteStatus::Pending);
            let history = store
                .get_site_history(id, Utc::now() - ChronoDuration::hours(1))
                .unwrap();
            assert_eq!(history.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_tick_budget_abandons_probes() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        );
        let addr = serve(router).await;

        let (_tmp, store) = temp_store();
        let id = add_site(&store, format!("http://{}/slow", addr));
        let store = Arc::new(store);

        let mut tight = settings();
        tight.budget = Duration::from_millis(200);
        let (scheduler, _rx) = build_scheduler(store.clone(), Duration::from_secs(15), tight);

        let summary = scheduler.run_tick().await;
        assert!(summary.timed_out);
        assert!(summary.sites.is_none());
        // pruning still ran
        assert!(summary.pruned.is_some());
        assert_eq!(store.get_target(id).unwrap().last_status, SiteStatus::Pending);
    }

    #[tokio::test]
    async fn test_tick_prunes_old_history() {
        let (_tmp, store) = temp_store();
        let refused = refused_addr().await;
        let id = add_site(&store, format!("http://{}/", refused));
        let old = Utc::now() - ChronoDuration::days(8);
        store
            .record_check(&CheckRecord {
                site_id: id,
                checked_at: old,
                status: SiteStatus::Down,
                status_code: None,
                response_time_ms: None,
                last_notified_down_at: Some(old),
            })
            .unwrap();

        let store = Arc::new(store);
        let (scheduler, _rx) = build_scheduler(store.clone(), Duration::from_secs(2), settings());
        let summary = scheduler.run_tick().await;

        assert_eq!(summary.pruned.unwrap().site_rows, 1);
        let history = store
            .get_site_history(id, Utc::now() - ChronoDuration::days(30))
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (_tmp, store) = temp_store();
        let mut fast = settings();
        fast.interval = Duration::from_millis(20);
        let (scheduler, _rx) = build_scheduler(Arc::new(store), Duration::from_secs(1), fast);
        let scheduler = Arc::new(scheduler);

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        // the loop has exited and released its handle on the scheduler
        assert_eq!(Arc::strong_count(&scheduler), 1);
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_tick() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "ok"
            }),
        );
        let addr = serve(router).await;

        let (_tmp, store) = temp_store();
        let id = add_site(&store, format!("http://{}/slow", addr));
        let store = Arc::new(store);
        let (scheduler, _rx) = build_scheduler(store.clone(), Duration::from_secs(5), settings());
        let scheduler = Arc::new(scheduler);

        // the first interval tick fires immediately
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert_eq!(store.get_target(id).unwrap().last_status, SiteStatus::Up);
        assert_eq!(Arc::strong_count(&scheduler), 1);
    }
}
