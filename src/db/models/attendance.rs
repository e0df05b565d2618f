use serde::{Deserialize, Serialize};

/// Server-side attendance record. `id` is the session identifier every
/// uploaded travel log must be tagged with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub date: Option<String>,
    pub check_in_time: Option<String>,
    pub check_out_time: Option<String>,
}

impl AttendanceRecord {
    /// An open session has a check-in but no check-out yet.
    pub fn is_open(&self) -> bool {
        self.check_in_time.is_some() && self.check_out_time.is_none()
    }
}
