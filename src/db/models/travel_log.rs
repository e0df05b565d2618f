use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One buffered GPS fix awaiting upload.
///
/// `recorded_at` is assigned at capture time; rows live in the buffer until
/// a bulk upload is confirmed, then the uploaded batch is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: f64,
    pub recorded_at: DateTime<Utc>,
}
