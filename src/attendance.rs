//! Check-in / check-out lifecycle around the tracking session.
//!
//! The server-assigned attendance id is what makes buffered samples
//! uploadable; it is persisted on check-in and cleared on check-out.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::api::BackendApi;
use crate::db::{AttendanceRecord, Database, KEY_ACCESS_TOKEN, KEY_ATTENDANCE_ID};
use crate::sync::Syncer;
use crate::tracking::TrackingController;

#[derive(Clone)]
pub struct AttendanceManager {
    db: Database,
    api: Arc<dyn BackendApi>,
    tracking: TrackingController,
    syncer: Syncer,
}

impl AttendanceManager {
    pub fn new(
        db: Database,
        api: Arc<dyn BackendApi>,
        tracking: TrackingController,
        syncer: Syncer,
    ) -> Self {
        Self {
            db,
            api,
            tracking,
            syncer,
        }
    }

    /// Check in with the server, persist the returned session id, and start
    /// tracking. The stored id is rolled back if tracking startup errors, so
    /// a later retry starts from a clean slate.
    pub async fn check_in(&self) -> Result<AttendanceRecord> {
        let token = self.db.get_kv(KEY_ACCESS_TOKEN).await?;

        let record = self
            .api
            .check_in(token.as_deref())
            .await
            .context("check-in request failed")?;

        self.db
            .set_kv(KEY_ATTENDANCE_ID, &record.id)
            .await
            .context("failed to persist attendance id")?;
        info!("Checked in, attendance id {}", record.id);

        match self.tracking.start().await {
            Ok(true) => {}
            Ok(false) => warn!("check-in succeeded but tracking was refused"),
            Err(err) => {
                if let Err(cleanup_err) = self.db.remove_kv(KEY_ATTENDANCE_ID).await {
                    warn!("failed to roll back attendance id: {cleanup_err:#}");
                }
                return Err(err);
            }
        }

        // Re-fetch so the stored id matches server truth (idempotent on the
        // server side; a concurrent check-in elsewhere may have won).
        if let Ok(Some(server)) = self.api.my_attendance(token.as_deref()).await {
            if server.is_open() && server.id != record.id {
                self.db.set_kv(KEY_ATTENDANCE_ID, &server.id).await?;
            }
        }

        Ok(record)
    }

    /// Check out, give buffered samples one last flush while the session id
    /// still exists, then stop tracking and clear the id. Flush failures at
    /// this point are logged and abandoned.
    pub async fn check_out(&self) -> Result<AttendanceRecord> {
        let token = self.db.get_kv(KEY_ACCESS_TOKEN).await?;

        let record = self
            .api
            .check_out(token.as_deref())
            .await
            .context("check-out request failed")?;

        self.syncer.try_sync().await;

        if let Err(err) = self.tracking.stop().await {
            warn!("failed to stop tracking on check-out: {err:#}");
        }

        self.db
            .remove_kv(KEY_ATTENDANCE_ID)
            .await
            .context("failed to clear attendance id")?;
        info!("Checked out, attendance id cleared");

        Ok(record)
    }

    /// Align the stored session id with the server's record for today.
    /// Used on app foreground to recover from optimistic-state drift.
    pub async fn reconcile(&self) -> Result<Option<AttendanceRecord>> {
        let token = self.db.get_kv(KEY_ACCESS_TOKEN).await?;
        let server = self
            .api
            .my_attendance(token.as_deref())
            .await
            .context("failed to fetch attendance record")?;

        match &server {
            Some(record) if record.is_open() => {
                self.db.set_kv(KEY_ATTENDANCE_ID, &record.id).await?;
            }
            _ => {
                self.db.remove_kv(KEY_ATTENDANCE_ID).await?;
            }
        }

        Ok(server)
    }

    /// The persisted session id, if any. Uploads are gated on its presence.
    pub async fn current_attendance_id(&self) -> Result<Option<String>> {
        self.db.get_kv(KEY_ATTENDANCE_ID).await
    }
}
