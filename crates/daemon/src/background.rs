// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background tasks spawned alongside the HTTP listener: the lease
//! reaper (§4.C: "runs on a fixed interval (~5s)") and, when enabled, the
//! tail-follow loop (§4.I).

use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

/// Sweep expired leases on a fixed interval until the process shuts down.
pub fn spawn_reaper(state: Arc<AppState>, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            let reclaimed = state.store.release_expired_leases();
            if reclaimed > 0 {
                tracing::info!(reclaimed, "lease reaper reclaimed expired tickets");
            }
        }
    })
}
