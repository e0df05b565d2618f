use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, KEY_LAST_FIX, KEY_TRACKING_MODE};
use crate::provider::{LocationProvider, PermissionStatus};
use crate::sync::Syncer;

use super::loop_worker::tracking_loop;
use super::mode::{TrackingMode, TrackingSettings};

const FIX_CHANNEL_CAPACITY: usize = 64;

struct LoopHandle {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

/// Owns the tracking lifecycle: permission checks, the provider
/// subscription, and the fix-processing loop.
#[derive(Clone)]
pub struct TrackingController {
    db: Database,
    provider: Arc<dyn LocationProvider>,
    syncer: Syncer,
    settings: TrackingSettings,
    inner: Arc<Mutex<LoopHandle>>,
}

impl TrackingController {
    pub fn new(
        db: Database,
        provider: Arc<dyn LocationProvider>,
        syncer: Syncer,
        settings: TrackingSettings,
    ) -> Self {
        Self {
            db,
            provider,
            syncer,
            settings,
            inner: Arc::new(Mutex::new(LoopHandle {
                handle: None,
                cancel_token: None,
            })),
        }
    }

    /// Begin background tracking in Active mode. Returns false (without
    /// error) when refused: simulated device, or permissions not yet
    /// granted. This checks permission state, it never prompts.
    pub async fn start(&self) -> Result<bool> {
        if !self.provider.is_physical_device() {
            info!("Location tracking only works on physical devices");
            return Ok(false);
        }

        let permissions = self.provider.permission_status().await;
        if !permissions.granted {
            info!("Location permission not granted");
            return Ok(false);
        }

        // Held for the whole sequence so concurrent starts cannot both pass
        // the already-running check and register two loops.
        let mut guard = self.inner.lock().await;
        if guard.handle.is_some() {
            info!("Tracking already active");
            return Ok(true);
        }

        self.db
            .set_kv(KEY_TRACKING_MODE, TrackingMode::Active.as_str())
            .await
            .context("failed to persist initial tracking mode")?;
        // Fresh session: the first fix makes no mode decision.
        self.db
            .remove_kv(KEY_LAST_FIX)
            .await
            .context("failed to clear last coordinate")?;

        let (fix_tx, fix_rx) = mpsc::channel(FIX_CHANNEL_CAPACITY);
        self.provider
            .start_updates(
                TrackingMode::Active.subscription_config(&self.settings),
                fix_tx.clone(),
            )
            .await
            .context("failed to register location subscription")?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            self.db.clone(),
            self.provider.clone(),
            self.syncer.clone(),
            self.settings,
            fix_rx,
            fix_tx,
            cancel_token.clone(),
        ));

        guard.handle = Some(handle);
        guard.cancel_token = Some(cancel_token);

        info!("Background tracking started (ACTIVE mode)");
        Ok(true)
    }

    /// Stop fix delivery and the processing loop. Safe to call repeatedly
    /// or when tracking never started.
    pub async fn stop(&self) -> Result<()> {
        if self.provider.is_running().await {
            self.provider
                .stop_updates()
                .await
                .context("failed to stop location subscription")?;
        }

        let (cancel_token, handle) = {
            let mut guard = self.inner.lock().await;
            (guard.cancel_token.take(), guard.handle.take())
        };

        if let Some(token) = cancel_token {
            token.cancel();
        }

        if let Some(handle) = handle {
            handle
                .await
                .context("tracking loop task failed to join")?;
        }

        info!("Background tracking stopped");
        Ok(())
    }

    /// Whether a subscription is registered right now, straight from the
    /// provider. No cached flag: the process may have restarted underneath
    /// a still-registered subscription.
    pub async fn is_active(&self) -> bool {
        self.provider.is_running().await
    }

    pub async fn permission_status(&self) -> PermissionStatus {
        self.provider.permission_status().await
    }

    pub async fn request_permissions(&self) -> PermissionStatus {
        self.provider.request_permissions().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{ApiError, BackendApi};
    use crate::db::{AttendanceRecord, TravelLog};
    use crate::provider::{Fix, ReplayProvider};
    use crate::sync::Connectivity;
    use async_trait::async_trait;

    struct NoopApi;

    #[async_trait]
    impl BackendApi for NoopApi {
        async fn upload_travel_logs(
            &self,
            _token: Option<&str>,
            _attendance_id: &str,
            _logs: &[TravelLog],
        ) -> Result<(), ApiError> {
            Ok(())
        }

        async fn check_in(&self, _token: Option<&str>) -> Result<AttendanceRecord, ApiError> {
            unimplemented!()
        }

        async fn check_out(&self, _token: Option<&str>) -> Result<AttendanceRecord, ApiError> {
            unimplemented!()
        }

        async fn my_attendance(
            &self,
            _token: Option<&str>,
        ) -> Result<Option<AttendanceRecord>, ApiError> {
            unimplemented!()
        }
    }

    struct Offline;

    #[async_trait]
    impl Connectivity for Offline {
        async fn is_online(&self) -> bool {
            false
        }
    }

    fn build_controller(provider: Arc<ReplayProvider>) -> (tempfile::TempDir, TrackingController) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("fieldtrack.sqlite3")).unwrap();
        let syncer = Syncer::new(db.clone(), Arc::new(NoopApi), Arc::new(Offline));
        let controller =
            TrackingController::new(db, provider, syncer, TrackingSettings::default());
        (dir, controller)
    }

    #[tokio::test]
    async fn refuses_to_start_on_simulated_device() {
        let provider = Arc::new(ReplayProvider::new().non_physical().with_granted_permissions());
        let (_dir, controller) = build_controller(provider.clone());

        assert!(!controller.start().await.unwrap());
        assert!(!controller.is_active().await);
        assert_eq!(provider.start_count().await, 0);
    }

    #[tokio::test]
    async fn refuses_to_start_without_permissions() {
        let provider = Arc::new(ReplayProvider::new());
        let (_dir, controller) = build_controller(provider.clone());

        assert!(!controller.start().await.unwrap());
        assert_eq!(provider.start_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_starts_register_one_subscription() {
        let provider = Arc::new(ReplayProvider::new().with_granted_permissions());
        let (_dir, controller) = build_controller(provider.clone());

        let (first, second) = tokio::join!(controller.start(), controller.start());
        assert!(first.unwrap());
        assert!(second.unwrap());
        assert_eq!(provider.start_count().await, 1);

        controller.stop().await.unwrap();
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn start_then_stop_round_trip() {
        let provider = Arc::new(ReplayProvider::new().with_granted_permissions());
        let (_dir, controller) = build_controller(provider.clone());

        assert!(controller.start().await.unwrap());
        assert!(controller.is_active().await);

        controller.stop().await.unwrap();
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let provider = Arc::new(ReplayProvider::new().with_granted_permissions());
        let (_dir, controller) = build_controller(provider.clone());

        // never started
        controller.stop().await.unwrap();
        assert!(!controller.is_active().await);

        controller.start().await.unwrap();
        controller.stop().await.unwrap();
        controller.stop().await.unwrap();
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn scripted_fixes_flow_into_the_buffer() {
        let script = vec![
            Fix {
                latitude: 19.0700,
                longitude: 72.8700,
                accuracy: Some(5.0),
                speed: Some(1.5),
            },
            Fix {
                latitude: 19.0701,
                longitude: 72.8700,
                accuracy: Some(5.0),
                speed: Some(0.0),
            },
        ];
        let provider = Arc::new(
            ReplayProvider::from_script(script, std::time::Duration::ZERO)
                .with_granted_permissions(),
        );

        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("fieldtrack.sqlite3")).unwrap();
        let syncer = Syncer::new(db.clone(), Arc::new(NoopApi), Arc::new(Offline));
        let controller = TrackingController::new(
            db.clone(),
            provider,
            syncer,
            TrackingSettings::default(),
        );

        controller.start().await.unwrap();

        // let the replay drain through the loop
        for _ in 0..50 {
            if db.drain_travel_logs().await.unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let logs = db.drain_travel_logs().await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].speed, 1.5);

        // the 11m hop dropped us to idle
        assert_eq!(
            db.get_kv(KEY_TRACKING_MODE).await.unwrap().as_deref(),
            Some("idle")
        );

        controller.stop().await.unwrap();
    }
}
