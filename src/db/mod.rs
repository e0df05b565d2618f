mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{AttendanceRecord, TravelLog};
pub use repositories::kv::{
    KEY_ACCESS_TOKEN, KEY_ATTENDANCE_ID, KEY_LAST_FIX, KEY_TRACKING_MODE,
};
