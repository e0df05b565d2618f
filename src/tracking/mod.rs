pub mod controller;
mod loop_worker;
pub mod mode;

pub use controller::TrackingController;
pub use mode::{TrackingMode, TrackingSettings, MODE_SWITCH_THRESHOLD_M};
