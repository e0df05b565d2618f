use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use crate::db::connection::Database;

/// Session identifier assigned by the attendance check-in endpoint.
pub const KEY_ATTENDANCE_ID: &str = "currentAttendanceId";
/// Bearer token for API calls. Read by the tracker, written by the host app.
pub const KEY_ACCESS_TOKEN: &str = "accessToken";
/// Last applied sampling mode, so a fresh activation resumes correctly.
pub const KEY_TRACKING_MODE: &str = "trackingMode";
/// Last observed coordinate (JSON), kept separate from the upload buffer so
/// mode decisions still have a reference point after a flush empties it.
pub const KEY_LAST_FIX: &str = "lastFix";

impl Database {
    pub async fn get_kv(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    pub async fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_kv(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}
