//! Seam between the tracker and the platform's location services.
//!
//! The tracker never talks to an OS daemon directly; it registers a fix sink
//! with a [`LocationProvider`] and reconfigures the subscription by stopping
//! and restarting it. The provider is also the single source of truth for
//! "is tracking on" and for permission state.

pub mod replay;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

pub use replay::ReplayProvider;

/// Requested positioning quality. Balanced trades freshness for battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    High,
    Balanced,
}

/// Parameters applied to the underlying subscription. A new fix is delivered
/// only after moving `distance_interval_m` or after `time_interval`,
/// whichever the platform honors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionConfig {
    pub accuracy: Accuracy,
    pub distance_interval_m: f64,
    pub time_interval: Duration,
}

/// One raw reading from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub foreground: bool,
    pub background: bool,
    pub granted: bool,
}

impl PermissionStatus {
    pub fn new(foreground: bool, background: bool) -> Self {
        Self {
            foreground,
            background,
            granted: foreground && background,
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Whether this provider is backed by real positioning hardware.
    /// Tracking refuses to start on simulated environments.
    fn is_physical_device(&self) -> bool;

    /// Register (or re-register) the subscription. Fixes flow into `sink`
    /// until `stop_updates` is called. Reconfiguration is stop-then-start;
    /// providers are not required to support changing a live subscription.
    async fn start_updates(
        &self,
        config: SubscriptionConfig,
        sink: mpsc::Sender<Fix>,
    ) -> Result<()>;

    /// Cancel fix delivery. A fix already handed to the sink still arrives.
    async fn stop_updates(&self) -> Result<()>;

    /// Whether a subscription is currently registered. Queried instead of a
    /// cached flag because the process may have been restarted underneath us.
    async fn is_running(&self) -> bool;

    async fn permission_status(&self) -> PermissionStatus;

    /// Prompt for permissions, foreground before background; some platforms
    /// reject a background request issued first.
    async fn request_permissions(&self) -> PermissionStatus;
}
