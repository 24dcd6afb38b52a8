// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tk_core::SystemClock;
use tk_engine::{Metrics, TailFollower, TicketStore, WarmReindexer};
use tk_storage::{EvidenceWriter, SnapshotWriter};
use tokio::net::TcpListener;

use tk_daemon::background::spawn_reaper;
use tk_daemon::{build_router, AppState, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tk_daemon=debug".into()),
        )
        .init();

    let config = Arc::new(Config::from_env());

    if let Err(e) = std::fs::create_dir_all(&config.logs_dir) {
        tracing::error!(error = %e, "failed to create logs dir");
        std::process::exit(1);
    }

    let clock: Arc<dyn tk_core::Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());

    let writer = match SnapshotWriter::open(&config.logs_dir) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            tracing::error!(error = %e, "failed to open snapshot writer");
            std::process::exit(1);
        }
    };
    let store = Arc::new(
        TicketStore::with_uuid_ids(clock.clone(), metrics.clone()).with_audit_writer(writer.clone()),
    );
    let evidence = Arc::new(EvidenceWriter::new(config.logs_dir.clone()));

    if config.engine.reindex_on_boot {
        let reindexer = WarmReindexer::new(&store, config.logs_dir.as_path());
        match reindexer.run() {
            Ok((report, watermark)) => {
                tracing::info!(
                    triage_replayed = report.triage_replayed,
                    reply_replayed = report.reply_replayed,
                    "warm reindex complete"
                );
                if let Err(e) = writer.update_watermark(watermark) {
                    tracing::warn!(error = %e, "failed to persist post-reindex watermark");
                }
            }
            Err(e) => tracing::error!(error = %e, "warm reindex failed"),
        }
    }

    let state = Arc::new(AppState::new(
        store.clone(),
        writer.clone(),
        evidence,
        metrics,
        config.clone(),
        clock,
    ));

    spawn_reaper(state.clone(), config.reaper_interval_ms);

    if config.engine.tail_snapshots {
        let follower = Arc::new(TailFollower::new(
            store,
            writer,
            config.engine.derivation.clone(),
            config.logs_dir.as_path(),
        ));
        tk_engine::spawn_tail_loop(follower, std::time::Duration::from_millis(config.tail_poll_interval_ms));
    }

    let app = build_router(state, config.clone());

    let listener = match TcpListener::bind(&config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr, "tkd listening");

    #[cfg(unix)]
    let sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            #[cfg(unix)]
            sigterm,
        ))
        .await
    {
        tracing::error!(error = %e, "server error");
    }
}

#[cfg(unix)]
async fn shutdown_signal(mut sigterm: tokio::signal::unix::Signal) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        sigterm.recv().await;
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
}
