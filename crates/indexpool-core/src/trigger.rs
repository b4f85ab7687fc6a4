// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coalesced wakeup signals for the reconcile and cleanup workers.
//!
//! Each trigger is a single-slot queue: any number of callers can fire it
//! while the worker is busy, and the worker sees exactly one pending wakeup
//! once it comes back around, not one per caller. This mirrors the
//! original system's `asyncio.Queue(maxsize=1)` with a non-blocking
//! `put_nowait` that swallows `QueueFull` as "already triggered".

use tokio::sync::mpsc;

/// One coalesced single-slot channel.
struct Slot {
    tx: mpsc::Sender<()>,
    rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Fire the trigger. A no-op if one is already pending.
    fn fire(&self) {
        let _ = self.tx.try_send(());
    }

    /// Wait for the trigger to fire.
    async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        rx.recv().await;
    }
}

/// Holds the reconcile and cleanup wakeup signals the provisioner's two
/// worker loops block on between cycles.
pub struct TriggerBus {
    reconcile: Slot,
    cleanup: Slot,
}

impl TriggerBus {
    /// Construct a bus with both triggers unset.
    pub fn new() -> Self {
        Self {
            reconcile: Slot::new(),
            cleanup: Slot::new(),
        }
    }

    /// Ask the reconcile worker to run a cycle as soon as it is free.
    pub fn trigger_reconcile(&self) {
        self.reconcile.fire();
    }

    /// Ask the cleanup worker to run a cycle as soon as it is free.
    pub fn trigger_cleanup(&self) {
        self.cleanup.fire();
    }

    /// Block until `trigger_reconcile` has fired since the last call.
    pub async fn wait_reconcile(&self) {
        self.reconcile.wait().await;
    }

    /// Block until `trigger_cleanup` has fired since the last call.
    pub async fn wait_cleanup(&self) {
        self.cleanup.wait().await;
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn multiple_triggers_coalesce_into_one_wakeup() {
        let bus = Arc::new(TriggerBus::new());
        bus.trigger_reconcile();
        bus.trigger_reconcile();
        bus.trigger_reconcile();

        tokio::time::timeout(Duration::from_millis(50), bus.wait_reconcile())
            .await
            .expect("first wait should resolve immediately");

        // no further wakeup pending
        let second = tokio::time::timeout(Duration::from_millis(20), bus.wait_reconcile()).await;
        assert!(second.is_err(), "second wait should not resolve");
    }

    #[tokio::test]
    async fn reconcile_and_cleanup_triggers_are_independent() {
        let bus = TriggerBus::new();
        bus.trigger_cleanup();

        let reconcile_wait = tokio::time::timeout(Duration::from_millis(20), bus.wait_reconcile()).await;
        assert!(reconcile_wait.is_err());

        tokio::time::timeout(Duration::from_millis(20), bus.wait_cleanup())
            .await
            .expect("cleanup wait should resolve");
    }
}
