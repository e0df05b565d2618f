pub mod attendance;
pub mod travel_log;

pub use attendance::AttendanceRecord;
pub use travel_log::TravelLog;
