use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{Accuracy, SubscriptionConfig};

/// Movement (meters since the previous fix) that separates "stationary"
/// from "moving". Independent of the delivery distance intervals below.
pub const MODE_SWITCH_THRESHOLD_M: f64 = 50.0;

const ACTIVE_INTERVAL_MS: u64 = 120_000; // 2 minutes
const IDLE_INTERVAL_MS: u64 = 600_000; // 10 minutes
const DISTANCE_THRESHOLD_M: f64 = 150.0;

/// Tunable sampling cadence. Defaults match the production deployment;
/// idle delivery distance is always double the active one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub distance_threshold_m: f64,
    pub mode_switch_threshold_m: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            active_interval_ms: ACTIVE_INTERVAL_MS,
            idle_interval_ms: IDLE_INTERVAL_MS,
            distance_threshold_m: DISTANCE_THRESHOLD_M,
            mode_switch_threshold_m: MODE_SWITCH_THRESHOLD_M,
        }
    }
}

/// Two-speed sampling state machine. Active trades battery for freshness
/// while the subject is moving; Idle backs off once they hold still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackingMode {
    Active,
    Idle,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Active => "active",
            TrackingMode::Idle => "idle",
        }
    }

    /// Parse the persisted mode; anything unrecognized falls back to Active.
    pub fn from_persisted(value: Option<&str>) -> Self {
        match value {
            Some("idle") => TrackingMode::Idle,
            _ => TrackingMode::Active,
        }
    }

    /// Transition on an observed movement distance: Active drops to Idle
    /// under the threshold, Idle climbs back at or above it.
    pub fn next(self, distance_moved_m: f64, threshold_m: f64) -> Self {
        match self {
            TrackingMode::Active if distance_moved_m < threshold_m => TrackingMode::Idle,
            TrackingMode::Idle if distance_moved_m >= threshold_m => TrackingMode::Active,
            other => other,
        }
    }

    pub fn subscription_config(&self, settings: &TrackingSettings) -> SubscriptionConfig {
        match self {
            TrackingMode::Active => SubscriptionConfig {
                accuracy: Accuracy::High,
                distance_interval_m: settings.distance_threshold_m,
                time_interval: Duration::from_millis(settings.active_interval_ms),
            },
            TrackingMode::Idle => SubscriptionConfig {
                accuracy: Accuracy::Balanced,
                distance_interval_m: settings.distance_threshold_m * 2.0,
                time_interval: Duration::from_millis(settings.idle_interval_ms),
            },
        }
    }
}
