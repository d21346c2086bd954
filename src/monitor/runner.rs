use super::{status_title, Monitor, TitleDisplay};
use crate::error::Result;
use crate::logs::LogSource;
use crate::process::ProcessBackend;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Drive the monitor until `shutdown` resolves, then flush state.
///
/// Ticks never overlap; a tick that overruns its interval causes the
/// missed ticks to be skipped rather than queued.
pub async fn run<S, B, F>(monitor: &mut Monitor<S, B>, shutdown: F) -> Result<()>
where
    S: LogSource,
    B: ProcessBackend,
    F: Future<Output = ()>,
{
    let show_title = monitor.supervisor().is_some() && monitor.config().crash_monitor.update_title;
    let mut title = TitleDisplay::new(show_title);

    monitor.start().await;

    let mut update = interval(monitor.config().update_interval());
    update.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut snapshot = interval(monitor.config().snapshot_interval());
    snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; nothing to save yet
    snapshot.tick().await;

    let refresh_secs = monitor.config().status_refresh_secs;
    let mut refresh = interval(Duration::from_secs(refresh_secs.unwrap_or(1).max(1)));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            _ = update.tick() => {
                let report = monitor.tick(Utc::now()).await;
                debug!("Tick: {:?}", report);
                title.set(status_title(monitor, Utc::now()));
            }
            _ = snapshot.tick() => {
                if let Err(e) = monitor.save_snapshot(Utc::now()) {
                    error!("Failed to save snapshots: {}", e);
                }
            }
            _ = refresh.tick(), if refresh_secs.is_some() => {
                let now = Utc::now();
                let uptime = monitor.uptime_tracker_mut().snapshot(now);
                debug!("Uptime: {:?}", uptime.uptime.formatted);
                title.set(status_title(monitor, now));
            }
        }
    }

    let timeout = monitor.config().shutdown_timeout();
    if tokio::time::timeout(timeout, monitor.shutdown(Utc::now()))
        .await
        .is_err()
    {
        warn!("Shutdown flush did not finish within {:?}", timeout);
    }

    title.restore();
    info!("Monitor stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
