use anyhow::Result;
use rusqlite::params;

use crate::db::{connection::Database, helpers::parse_datetime, models::TravelLog};

impl Database {
    /// Append one sample to the buffer. Each call is a fresh read-modify-write
    /// against durable storage; nothing is assumed about prior in-memory state.
    pub async fn append_travel_log(&self, log: &TravelLog) -> Result<()> {
        let record = log.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO travel_logs (latitude, longitude, accuracy, speed, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.latitude,
                    record.longitude,
                    record.accuracy,
                    record.speed,
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Full buffer contents in insertion order, without clearing.
    pub async fn drain_travel_logs(&self) -> Result<Vec<TravelLog>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, latitude, longitude, accuracy, speed, recorded_at
                 FROM travel_logs
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut logs = Vec::new();
            while let Some(row) = rows.next()? {
                logs.push(TravelLog {
                    id: Some(row.get::<_, i64>(0)?),
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    accuracy: row.get(3)?,
                    speed: row.get(4)?,
                    recorded_at: parse_datetime(&row.get::<_, String>(5)?, "recorded_at")?,
                });
            }

            Ok(logs)
        })
        .await
    }

    /// Empty the buffer. Called only after a confirmed successful upload of
    /// everything returned by the most recent drain.
    pub async fn clear_travel_logs(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM travel_logs", [])?;
            Ok(())
        })
        .await
    }

    /// Delete rows up to and including `max_id`. A sample appended between
    /// the drain and the upload confirmation survives for the next flush.
    pub async fn clear_travel_logs_through(&self, max_id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute("DELETE FROM travel_logs WHERE id <= ?1", params![max_id])?;
            Ok(())
        })
        .await
    }
}
