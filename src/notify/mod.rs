//! Notification module.
//!
//! Alerts are queued on a [`Dispatcher`] and delivered by a background worker,
//! so a tick never waits on the messaging endpoint.

mod telegram;

pub use telegram::*;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{DbError, NodeLiveness, SiteStatus, Store, Target};

/// Capacity of the delivery queue. Alerts beyond it are dropped.
const QUEUE_CAPACITY: usize = 1000;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messaging endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("could not read notifier settings: {0}")]
    Store(#[from] DbError),
}

/// What a state transition asks the operator to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// First unhealthy observation after a healthy or pending one.
    Down,
    /// Unhealthy for longer than the re-notify interval.
    StillDown,
    Recovered,
}

/// A plain-text message for the messaging endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// `None` for messages not caused by a transition.
    pub alert: Option<Alert>,
    pub text: String,
}

impl Notification {
    pub fn site(alert: Alert, target: &Target, status: SiteStatus, status_code: Option<u16>) -> Self {
        let name = target.display_name();
        let code = status_code.map_or_else(|| "none".to_string(), |c| c.to_string());
        let status = status.as_str().to_lowercase();

        let text = match alert {
            Alert::Down => format!(
                "🔴 Site down: *{}* {} (code: {}).\n{}",
                name, status, code, target.url
            ),
            Alert::StillDown => format!(
                "🔴 Site still down: *{}* {} (code: {}).\n{}",
                name, status, code, target.url
            ),
            Alert::Recovered => {
                format!("✅ Site recovered: *{}* is back online.\n{}", name, target.url)
            }
        };

        Self {
            alert: Some(alert),
            text,
        }
    }

    pub fn node(alert: Alert, node: &NodeLiveness) -> Self {
        let name = node.display_name();
        let last = format_report_time(node.last_report);

        let text = match alert {
            Alert::Down => format!("🔴 Node offline: *{}*. Last report: {}.", name, last),
            Alert::StillDown => {
                format!("🔴 Node still offline: *{}*. Last report: {}.", name, last)
            }
            Alert::Recovered => {
                format!("✅ Node recovered: *{}* is reporting again. Last report: {}.", name, last)
            }
        };

        Self {
            alert: Some(alert),
            text,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            alert: None,
            text: text.into(),
        }
    }
}

fn format_report_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Fire-and-forget handle for queueing notifications.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Notification>,
    /// Settings consulted before queueing. `None` queues unconditionally.
    store: Option<Arc<Store>>,
}

impl Dispatcher {
    /// Start the delivery worker. The worker exits, after draining the queue,
    /// once every `Dispatcher` clone has been dropped.
    pub fn start(store: Arc<Store>, sender: TelegramSender) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::gated(store.clone());
        let handle = tokio::spawn(run_delivery_worker(rx, store, sender));
        (dispatcher, handle)
    }

    /// A dispatcher whose queue is read by the caller.
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx, store: None }, rx)
    }

    /// Like [`Dispatcher::channel`], but drops notifications while the
    /// notifier in `store` is inactive.
    fn gated(store: Arc<Store>) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (
            Self {
                tx,
                store: Some(store),
            },
            rx,
        )
    }

    fn accepting(&self) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        match store.get_notifier_config() {
            Ok(cfg) => cfg.is_active(),
            Err(e) => {
                tracing::error!("Notifier: Failed to read settings: {}", e);
                false
            }
        }
    }

    /// Queue a notification without waiting for delivery. Nothing is queued
    /// while notifications are disabled or unconfigured.
    pub fn dispatch(&self, notification: Notification) {
        if !self.accepting() {
            tracing::debug!("Notifier: Inactive, skipping notification");
            return;
        }
        if let Err(e) = self.tx.try_send(notification) {
            tracing::warn!("Notifier: Dropping notification: {}", e);
        }
    }
}

async fn run_delivery_worker(
    mut rx: mpsc::Receiver<Notification>,
    store: Arc<Store>,
    sender: TelegramSender,
) {
    while let Some(notification) = rx.recv().await {
        if let Err(e) = sender.deliver(&store, &notification.text).await {
            tracing::error!("Notifier: Delivery failed: {}", e);
        }
    }
    tracing::debug!("Notifier: Delivery worker stopped");
}
