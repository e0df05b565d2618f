pub mod kv;
pub mod travel_logs;
