//! Client for the attendance / travel-log backend.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::db::{AttendanceRecord, TravelLog};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, DNS, timeout: the request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-2xx status; the body text is the message.
    #[error("server rejected request ({status}): {message}")]
    Status { status: StatusCode, message: String },
}

/// Everything the tracker needs from the backend. Kept behind a trait so the
/// synchronizer and attendance flow can be exercised without a server.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn upload_travel_logs(
        &self,
        token: Option<&str>,
        attendance_id: &str,
        logs: &[TravelLog],
    ) -> Result<(), ApiError>;

    async fn check_in(&self, token: Option<&str>) -> Result<AttendanceRecord, ApiError>;

    async fn check_out(&self, token: Option<&str>) -> Result<AttendanceRecord, ApiError>;

    /// Today's attendance record, or None when nothing was recorded yet.
    async fn my_attendance(&self, token: Option<&str>) -> Result<Option<AttendanceRecord>, ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TravelLogUpload<'a> {
    attendance_id: &'a str,
    latitude: f64,
    longitude: f64,
    recorded_at: DateTime<Utc>,
    speed: f64,
}

pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn into_checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, message })
    }

    /// Parse the `/api/Attendance/my` body: the server returns an array with
    /// today's record first, a bare object, or null.
    fn parse_my_attendance(value: serde_json::Value) -> AnyResult<Option<AttendanceRecord>> {
        let record = match value {
            serde_json::Value::Null => None,
            serde_json::Value::Array(mut items) => {
                if items.is_empty() {
                    None
                } else {
                    Some(serde_json::from_value(items.remove(0))?)
                }
            }
            other => Some(serde_json::from_value(other)?),
        };
        Ok(record)
    }
}

#[async_trait]
impl BackendApi for HttpApi {
    async fn upload_travel_logs(
        &self,
        token: Option<&str>,
        attendance_id: &str,
        logs: &[TravelLog],
    ) -> Result<(), ApiError> {
        if logs.is_empty() {
            return Ok(());
        }

        let payload: Vec<TravelLogUpload<'_>> = logs
            .iter()
            .map(|log| TravelLogUpload {
                attendance_id,
                latitude: log.latitude,
                longitude: log.longitude,
                recorded_at: log.recorded_at,
                speed: log.speed,
            })
            .collect();

        let response = self
            .request(reqwest::Method::POST, "/api/travellog/bulk", token)
            .json(&payload)
            .send()
            .await?;
        Self::into_checked(response).await?;

        info!("Uploaded {} travel logs", payload.len());
        Ok(())
    }

    async fn check_in(&self, token: Option<&str>) -> Result<AttendanceRecord, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/api/Attendance/check-in", token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let response = Self::into_checked(response).await?;
        Ok(response.json().await?)
    }

    async fn check_out(&self, token: Option<&str>) -> Result<AttendanceRecord, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/api/Attendance/check-out", token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let response = Self::into_checked(response).await?;
        Ok(response.json().await?)
    }

    async fn my_attendance(
        &self,
        token: Option<&str>,
    ) -> Result<Option<AttendanceRecord>, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/api/Attendance/my", token)
            .send()
            .await?;
        let response = Self::into_checked(response).await?;
        let value: serde_json::Value = response.json().await?;
        match Self::parse_my_attendance(value) {
            Ok(record) => Ok(record),
            Err(err) => {
                warn!("unexpected attendance payload: {err:#}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let api = HttpApi::new("https://api.example.com/").unwrap();
        assert_eq!(api.base_url(), "https://api.example.com");
    }

    #[test]
    fn upload_payload_shape_matches_wire_format() {
        let upload = TravelLogUpload {
            attendance_id: "abc123",
            latitude: 19.07,
            longitude: 72.87,
            recorded_at: "2024-01-01T10:00:00Z".parse().unwrap(),
            speed: 0.0,
        };

        let value = serde_json::to_value(upload).unwrap();
        assert_eq!(value["attendanceId"], "abc123");
        assert_eq!(value["latitude"], 19.07);
        assert_eq!(value["recordedAt"], "2024-01-01T10:00:00Z");
        assert_eq!(value["speed"], 0.0);
    }

    #[test]
    fn my_attendance_parses_array_object_and_null() {
        let array = serde_json::json!([
            { "id": "a1", "date": "2025-10-28", "checkInTime": "09:05", "checkOutTime": null }
        ]);
        let record = HttpApi::parse_my_attendance(array).unwrap().unwrap();
        assert_eq!(record.id, "a1");
        assert!(record.is_open());

        let object = serde_json::json!({ "id": "a2", "checkInTime": "09:05", "checkOutTime": "18:00" });
        let record = HttpApi::parse_my_attendance(object).unwrap().unwrap();
        assert!(!record.is_open());

        assert!(HttpApi::parse_my_attendance(serde_json::Value::Null)
            .unwrap()
            .is_none());
        assert!(HttpApi::parse_my_attendance(serde_json::json!([]))
            .unwrap()
            .is_none());
    }
}
