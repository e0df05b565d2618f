use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, TravelLog, KEY_LAST_FIX, KEY_TRACKING_MODE};
use crate::geo;
use crate::provider::{Fix, LocationProvider};
use crate::sync::Syncer;

use super::mode::{TrackingMode, TrackingSettings};

/// Drives fix handling until the subscription closes or stop cancels us.
/// A fix whose handling already began runs to completion and is persisted;
/// cancellation is only observed between fixes.
pub(crate) async fn tracking_loop(
    db: Database,
    provider: Arc<dyn LocationProvider>,
    syncer: Syncer,
    settings: TrackingSettings,
    mut fixes: mpsc::Receiver<Fix>,
    resubscribe_sink: mpsc::Sender<Fix>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_fix = fixes.recv() => {
                match maybe_fix {
                    Some(fix) => {
                        match handle_fix(&db, provider.as_ref(), &settings, &resubscribe_sink, fix).await {
                            Ok(()) => {
                                // Sync piggybacks on fix arrival; failures are
                                // retried on the next fix.
                                syncer.try_sync().await;
                            }
                            Err(err) => error!("fix handling failed: {err:?}"),
                        }
                    }
                    None => break,
                }
            }
            _ = cancel_token.cancelled() => {
                info!("tracking loop shutting down");
                break;
            }
        }
    }
}

/// Process one fix as a self-contained activation: all history (previous
/// coordinate, current mode) is reloaded from durable storage, never assumed
/// to have survived in memory.
pub(crate) async fn handle_fix(
    db: &Database,
    provider: &dyn LocationProvider,
    settings: &TrackingSettings,
    sink: &mpsc::Sender<Fix>,
    fix: Fix,
) -> Result<()> {
    // The reference coordinate lives in the KV table, not the upload buffer:
    // a flush between fixes empties the buffer, but the mode decision still
    // needs the previous position.
    let previous = load_last_fix(db).await?;

    if let Some(prev) = &previous {
        let moved_m = geo::distance_meters(prev.latitude, prev.longitude, fix.latitude, fix.longitude);

        let mode = TrackingMode::from_persisted(db.get_kv(KEY_TRACKING_MODE).await?.as_deref());
        let next = mode.next(moved_m, settings.mode_switch_threshold_m);

        if next != mode {
            info!("moved {moved_m:.0}m since last fix, switching to {} mode", next.as_str());
            db.set_kv(KEY_TRACKING_MODE, next.as_str())
                .await
                .context("failed to persist tracking mode")?;
            restart_subscription(provider, next, settings, sink).await;
        }
    }

    let entry = TravelLog {
        id: None,
        latitude: fix.latitude,
        longitude: fix.longitude,
        accuracy: fix.accuracy,
        speed: fix.speed.unwrap_or(0.0),
        recorded_at: Utc::now(),
    };

    db.append_travel_log(&entry)
        .await
        .context("failed to buffer travel log")?;

    db.set_kv(KEY_LAST_FIX, &serde_json::to_string(&fix)?)
        .await
        .context("failed to persist last coordinate")?;

    Ok(())
}

async fn load_last_fix(db: &Database) -> Result<Option<Fix>> {
    let Some(raw) = db.get_kv(KEY_LAST_FIX).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(fix) => Ok(Some(fix)),
        Err(err) => {
            warn!("discarding unreadable last coordinate: {err}");
            Ok(None)
        }
    }
}

/// Apply new subscription parameters with a stop-then-start cycle; dynamic
/// reconfiguration of a live subscription is not assumed to exist.
async fn restart_subscription(
    provider: &dyn LocationProvider,
    mode: TrackingMode,
    settings: &TrackingSettings,
    sink: &mpsc::Sender<Fix>,
) {
    if let Err(err) = provider.stop_updates().await {
        warn!("failed to stop subscription before reconfigure: {err:#}");
    }
    if let Err(err) = provider
        .start_updates(mode.subscription_config(settings), sink.clone())
        .await
    {
        error!("failed to restart subscription in {} mode: {err:#}", mode.as_str());
    }
}
