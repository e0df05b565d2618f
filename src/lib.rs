//! Adaptive background location tracking with an offline-first buffer.
//!
//! Fixes from a [`provider::LocationProvider`] land in a durable SQLite
//! buffer and are opportunistically flushed to the backend once a server
//! confirmed attendance id exists. Sampling runs a two-speed state machine:
//! frequent high-accuracy fixes while moving, a low-power cadence when the
//! subject holds still.

pub mod api;
pub mod attendance;
pub mod db;
pub mod geo;
pub mod provider;
pub mod settings;
pub mod sync;
pub mod tracking;

use std::sync::Arc;

use anyhow::Result;

use api::BackendApi;
use attendance::AttendanceManager;
use db::Database;
use provider::{LocationProvider, PermissionStatus};
use sync::{Connectivity, Syncer};
use tracking::{TrackingController, TrackingSettings};

/// Facade wiring the store, provider, synchronizer, and attendance flow
/// together. This is the only type a host UI needs to hold.
pub struct Tracker {
    controller: TrackingController,
    attendance: AttendanceManager,
    syncer: Syncer,
}

impl Tracker {
    pub fn new(
        db: Database,
        provider: Arc<dyn LocationProvider>,
        api: Arc<dyn BackendApi>,
        connectivity: Arc<dyn Connectivity>,
        settings: TrackingSettings,
    ) -> Self {
        let syncer = Syncer::new(db.clone(), api.clone(), connectivity);
        let controller = TrackingController::new(db.clone(), provider, syncer.clone(), settings);
        let attendance = AttendanceManager::new(db, api, controller.clone(), syncer.clone());

        Self {
            controller,
            attendance,
            syncer,
        }
    }

    pub async fn start_background_tracking(&self) -> Result<bool> {
        self.controller.start().await
    }

    pub async fn stop_background_tracking(&self) -> Result<()> {
        self.controller.stop().await
    }

    pub async fn is_tracking_active(&self) -> bool {
        self.controller.is_active().await
    }

    pub async fn get_location_permission_status(&self) -> PermissionStatus {
        self.controller.permission_status().await
    }

    pub async fn request_location_permissions(&self) -> PermissionStatus {
        self.controller.request_permissions().await
    }

    /// Manual flush, e.g. on app foreground. Same gating as the automatic
    /// sync that follows every fix.
    pub async fn sync_now(&self) -> sync::SyncOutcome {
        self.syncer.try_sync().await
    }

    pub fn attendance(&self) -> &AttendanceManager {
        &self.attendance
    }
}
