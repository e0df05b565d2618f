use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use fieldtrack::{
    api::HttpApi,
    db::{Database, KEY_ACCESS_TOKEN},
    provider::{Fix, ReplayProvider},
    settings::SettingsStore,
    sync::TcpProbe,
    Tracker,
};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// Replay daemon: checks in, feeds a recorded fixture through the tracker,
/// and checks out on ctrl-c. Configuration comes from the environment:
/// FIELDTRACK_DATA_DIR, FIELDTRACK_SETTINGS, FIELDTRACK_ACCESS_TOKEN, and
/// FIELDTRACK_REPLAY (a JSONL file of fixes).
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("fieldtrack starting up...");

    let data_dir = std::env::var("FIELDTRACK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let settings_path = std::env::var("FIELDTRACK_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("settings.json"));
    let settings = SettingsStore::new(settings_path)?;

    let db = Database::new(data_dir.join("fieldtrack.sqlite3"))?;

    if let Ok(token) = std::env::var("FIELDTRACK_ACCESS_TOKEN") {
        db.set_kv(KEY_ACCESS_TOKEN, &token).await?;
    }

    let fixture = match std::env::var("FIELDTRACK_REPLAY") {
        Ok(path) => path,
        Err(_) => bail!("FIELDTRACK_REPLAY must point to a JSONL file of fixes"),
    };
    let script = load_fixture(&fixture)?;
    info!("loaded {} fixes from {fixture}", script.len());

    let base_url = settings.api_base_url();
    let api = Arc::new(HttpApi::new(base_url.as_str()).context("failed to build API client")?);
    let connectivity = Arc::new(TcpProbe::for_base_url(&base_url)?);
    let provider = Arc::new(ReplayProvider::from_script(script, Duration::from_secs(2)));

    let tracker = Tracker::new(db, provider, api, connectivity, settings.tracking());

    let permissions = tracker.request_location_permissions().await;
    if !permissions.granted {
        bail!("location permissions were not granted");
    }

    tracker.attendance().check_in().await?;

    // Foreground-style status poll, independent of the tracking cadence.
    let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
    ticker.tick().await; // consume the immediate first tick
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let active = tracker.is_tracking_active().await;
                info!("tracking {}", if active { "active" } else { "off" });
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }
    info!("shutting down");

    if let Err(err) = tracker.attendance().check_out().await {
        warn!("check-out on shutdown failed: {err:#}");
        tracker.stop_background_tracking().await?;
    }

    Ok(())
}

fn load_fixture(path: &str) -> Result<Vec<Fix>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay fixture {path}"))?;

    let mut fixes = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fix: Fix = serde_json::from_str(line)
            .with_context(|| format!("invalid fix on line {} of {path}", idx + 1))?;
        fixes.push(fix);
    }

    Ok(fixes)
}
