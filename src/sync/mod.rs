//! Opportunistic flushing of the travel-log buffer.
//!
//! No retry timer: a failed upload is simply retried when the next fix
//! arrives, which bounds the retry cadence by the sampling interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};

use crate::api::BackendApi;
use crate::db::{Database, KEY_ACCESS_TOKEN, KEY_ATTENDANCE_ID};

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Cheap reachability check: can we open a TCP connection to the API host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    /// Probe the host/port of the API base url.
    pub fn for_base_url(base_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("base url {base_url} has no host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("base url {base_url} has no port"))?;
        Ok(Self::new(host, port))
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        let addr = format!("{}:{}", self.host, self.port);
        matches!(
            tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Why a sync attempt did not upload anything, or how much it uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Uploaded(usize),
    Offline,
    EmptyBuffer,
    /// No attendance id yet; samples stay buffered rather than being sent
    /// without a session to attribute them to.
    MissingSession,
    /// Storage or upload error; the buffer is untouched and the next fix
    /// arrival retries naturally.
    Failed,
}

#[derive(Clone)]
pub struct Syncer {
    db: Database,
    api: Arc<dyn BackendApi>,
    connectivity: Arc<dyn Connectivity>,
}

impl Syncer {
    pub fn new(db: Database, api: Arc<dyn BackendApi>, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            db,
            api,
            connectivity,
        }
    }

    /// Best-effort flush. Never fails the caller; upload problems are logged
    /// and the buffer is left intact for the next attempt.
    pub async fn try_sync(&self) -> SyncOutcome {
        match self.sync_once().await {
            Ok(outcome) => {
                match outcome {
                    SyncOutcome::Uploaded(count) => info!("Synced {count} buffered travel logs"),
                    SyncOutcome::MissingSession => {
                        warn!("No currentAttendanceId found, skipping upload")
                    }
                    SyncOutcome::Offline | SyncOutcome::EmptyBuffer => {
                        debug!("Sync skipped: {outcome:?}")
                    }
                    SyncOutcome::Failed => {}
                }
                outcome
            }
            Err(err) => {
                warn!("Upload error: {err:#}");
                SyncOutcome::Failed
            }
        }
    }

    async fn sync_once(&self) -> Result<SyncOutcome> {
        if !self.connectivity.is_online().await {
            return Ok(SyncOutcome::Offline);
        }

        let logs = self.db.drain_travel_logs().await?;
        if logs.is_empty() {
            return Ok(SyncOutcome::EmptyBuffer);
        }

        let Some(attendance_id) = self.db.get_kv(KEY_ATTENDANCE_ID).await? else {
            return Ok(SyncOutcome::MissingSession);
        };

        let token = self.db.get_kv(KEY_ACCESS_TOKEN).await?;
        let count = logs.len();

        self.api
            .upload_travel_logs(token.as_deref(), &attendance_id, &logs)
            .await?;

        // Clear only what the confirmed upload covered; a sample appended
        // while the upload was in flight survives for the next flush.
        match logs.last().and_then(|log| log.id) {
            Some(max_id) => self.db.clear_travel_logs_through(max_id).await?,
            None => self.db.clear_travel_logs().await?,
        }

        Ok(SyncOutcome::Uploaded(count))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use reqwest::StatusCode;

    use super::*;
    use crate::api::ApiError;
    use crate::db::TravelLog;

    struct FixedConnectivity(bool);

    #[async_trait]
    impl Connectivity for FixedConnectivity {
        async fn is_online(&self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        fail_uploads: bool,
        uploads: Mutex<Vec<(Option<String>, String, Vec<TravelLog>)>>,
    }

    #[async_trait]
    impl BackendApi for RecordingApi {
        async fn upload_travel_logs(
            &self,
            token: Option<&str>,
            attendance_id: &str,
            logs: &[TravelLog],
        ) -> Result<(), ApiError> {
            if self.fail_uploads {
                return Err(ApiError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "boom".into(),
                });
            }
            self.uploads.lock().unwrap().push((
                token.map(String::from),
                attendance_id.to_string(),
                logs.to_vec(),
            ));
            Ok(())
        }

        async fn check_in(&self, _token: Option<&str>) -> Result<crate::db::AttendanceRecord, ApiError> {
            unimplemented!("not used in sync tests")
        }

        async fn check_out(&self, _token: Option<&str>) -> Result<crate::db::AttendanceRecord, ApiError> {
            unimplemented!("not used in sync tests")
        }

        async fn my_attendance(
            &self,
            _token: Option<&str>,
        ) -> Result<Option<crate::db::AttendanceRecord>, ApiError> {
            unimplemented!("not used in sync tests")
        }
    }

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("fieldtrack.sqlite3")).unwrap();
        (dir, db)
    }

    fn sample(lat: f64) -> TravelLog {
        TravelLog {
            id: None,
            latitude: lat,
            longitude: 72.87,
            accuracy: None,
            speed: 0.0,
            recorded_at: Utc::now(),
        }
    }

    async fn seed(db: &Database, n: usize) {
        for i in 0..n {
            db.append_travel_log(&sample(19.0 + i as f64 * 0.001))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn skips_upload_without_attendance_id() {
        let (_dir, db) = open_test_db();
        seed(&db, 3).await;

        let api = Arc::new(RecordingApi::default());
        let syncer = Syncer::new(
            db.clone(),
            api.clone(),
            Arc::new(FixedConnectivity(true)),
        );

        assert_eq!(syncer.try_sync().await, SyncOutcome::MissingSession);
        assert!(api.uploads.lock().unwrap().is_empty());
        assert_eq!(db.drain_travel_logs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn uploads_tagged_batch_and_clears_buffer() {
        let (_dir, db) = open_test_db();
        seed(&db, 3).await;
        db.set_kv(KEY_ATTENDANCE_ID, "abc123").await.unwrap();
        db.set_kv(KEY_ACCESS_TOKEN, "token-1").await.unwrap();

        let api = Arc::new(RecordingApi::default());
        let syncer = Syncer::new(
            db.clone(),
            api.clone(),
            Arc::new(FixedConnectivity(true)),
        );

        assert_eq!(syncer.try_sync().await, SyncOutcome::Uploaded(3));

        let uploads = api.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        let (token, attendance_id, logs) = &uploads[0];
        assert_eq!(token.as_deref(), Some("token-1"));
        assert_eq!(attendance_id, "abc123");
        assert_eq!(logs.len(), 3);
        drop(uploads);

        assert!(db.drain_travel_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_keeps_buffer_intact() {
        let (_dir, db) = open_test_db();
        seed(&db, 3).await;
        db.set_kv(KEY_ATTENDANCE_ID, "abc123").await.unwrap();

        let api = Arc::new(RecordingApi {
            fail_uploads: true,
            ..Default::default()
        });
        let syncer = Syncer::new(
            db.clone(),
            api,
            Arc::new(FixedConnectivity(true)),
        );

        syncer.try_sync().await;
        assert_eq!(db.drain_travel_logs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn offline_means_no_reads_or_uploads() {
        let (_dir, db) = open_test_db();
        seed(&db, 2).await;
        db.set_kv(KEY_ATTENDANCE_ID, "abc123").await.unwrap();

        let api = Arc::new(RecordingApi::default());
        let syncer = Syncer::new(
            db.clone(),
            api.clone(),
            Arc::new(FixedConnectivity(false)),
        );

        assert_eq!(syncer.try_sync().await, SyncOutcome::Offline);
        assert!(api.uploads.lock().unwrap().is_empty());
        assert_eq!(db.drain_travel_logs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_buffer_is_a_noop() {
        let (_dir, db) = open_test_db();
        db.set_kv(KEY_ATTENDANCE_ID, "abc123").await.unwrap();

        let api = Arc::new(RecordingApi::default());
        let syncer = Syncer::new(
            db.clone(),
            api.clone(),
            Arc::new(FixedConnectivity(true)),
        );

        assert_eq!(syncer.try_sync().await, SyncOutcome::EmptyBuffer);
        assert!(api.uploads.lock().unwrap().is_empty());
    }
}
