//! Status transition rules shared by sites and nodes.
//!
//! Decides whether a health observation produces an alert and what the
//! stored `last_notified_down_at` becomes afterwards.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::notify::Alert;

/// Result of evaluating one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub alert: Option<Alert>,
    pub last_notified_down_at: Option<DateTime<Utc>>,
}

/// Apply the transition rules.
///
/// `was_unhealthy` is the previous classification (PENDING counts as
/// healthy); `is_unhealthy` the new one.
pub fn evaluate(
    was_unhealthy: bool,
    is_unhealthy: bool,
    last_notified_down_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    renotify_interval: Duration,
) -> Decision {
    match (was_unhealthy, is_unhealthy) {
        (false, true) => Decision {
            alert: Some(Alert::Down),
            last_notified_down_at: Some(now),
        },
        (true, true) => {
            if renotify_due(last_notified_down_at, now, renotify_interval) {
                Decision {
                    alert: Some(Alert::StillDown),
                    last_notified_down_at: Some(now),
                }
            } else {
                Decision {
                    alert: None,
                    last_notified_down_at,
                }
            }
        }
        (true, false) => Decision {
            alert: Some(Alert::Recovered),
            last_notified_down_at: None,
        },
        (false, false) => Decision {
            alert: None,
            last_notified_down_at,
        },
    }
}

/// Unset, or strictly older than the interval.
fn renotify_due(
    last_notified_down_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> bool {
    match last_notified_down_at {
        None => true,
        Some(last) => (now - last).to_std().is_ok_and(|elapsed| elapsed > interval),
    }
}
