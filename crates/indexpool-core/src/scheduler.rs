// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A once-daily wall-clock timer that fires the cleanup cycle.
//!
//! Missed fires are not backfilled — if the process was down across the
//! scheduled time, the next occurrence simply runs at its normal time the
//! following day. Runs never overlap: the scheduler awaits one cleanup
//! cycle to completion before computing the next fire time.

use chrono::{NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::provisioner::Provisioner;

/// Fires [`Provisioner::scheduled_cleanup`] once a day at a fixed
/// wall-clock time.
pub struct Scheduler {
    fire_at: NaiveTime,
}

impl Scheduler {
    /// Build a scheduler that fires at the given time of day (local to the
    /// `Utc` clock this crate runs its comparisons against).
    pub fn new(fire_at: NaiveTime) -> Self {
        Self { fire_at }
    }

    /// Run until cancelled, invoking the provisioner's cleanup cycle once
    /// per day at the configured time.
    pub async fn run(&self, provisioner: &Provisioner, cancel: CancellationToken) {
        loop {
            let sleep_duration = self.duration_until_next_fire();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(sleep_duration) => {}
            }

            if let Err(err) = provisioner.scheduled_cleanup().await {
                warn!(error = %err, "scheduled cleanup failed");
            }
        }
    }

    fn duration_until_next_fire(&self) -> std::time::Duration {
        let now = Utc::now();
        let today_fire = now.date_naive().and_time(self.fire_at).and_utc();
        let next_fire = if today_fire > now {
            today_fire
        } else {
            today_fire + chrono::Duration::days(1)
        };
        (next_fire - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_until_next_fire_is_never_negative() {
        let scheduler = Scheduler::new(NaiveTime::from_hms_opt(8, 3, 0).unwrap());
        let duration = scheduler.duration_until_next_fire();
        assert!(duration <= std::time::Duration::from_secs(24 * 60 * 60));
    }
}
