use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::info;
use tokio::sync::{mpsc, Mutex};

use super::{Fix, LocationProvider, PermissionStatus, SubscriptionConfig};

struct ReplayState {
    running: bool,
    foreground_granted: bool,
    background_granted: bool,
    sink: Option<mpsc::Sender<Fix>>,
    config: Option<SubscriptionConfig>,
    script: Vec<Fix>,
    start_count: u32,
}

/// Location provider fed from a prepared script instead of GPS hardware.
/// Used by the daemon's replay mode and by tests; fixes can also be pushed
/// one at a time while a subscription is registered.
pub struct ReplayProvider {
    physical: bool,
    grant_on_request: bool,
    script_interval: Duration,
    state: Mutex<ReplayState>,
}

impl ReplayProvider {
    pub fn new() -> Self {
        Self {
            physical: true,
            grant_on_request: true,
            script_interval: Duration::ZERO,
            state: Mutex::new(ReplayState {
                running: false,
                foreground_granted: false,
                background_granted: false,
                sink: None,
                config: None,
                script: Vec::new(),
                start_count: 0,
            }),
        }
    }

    /// Emit `script` fixes (one every `interval`) each time updates start.
    pub fn from_script(script: Vec<Fix>, interval: Duration) -> Self {
        let mut provider = Self::new();
        provider.script_interval = interval;
        provider.state.get_mut().script = script;
        provider
    }

    /// Simulated environment; tracking must refuse to start.
    pub fn non_physical(mut self) -> Self {
        self.physical = false;
        self
    }

    /// Deny permission prompts, as a user would from the system dialog.
    pub fn deny_permissions(mut self) -> Self {
        self.grant_on_request = false;
        self
    }

    pub fn with_granted_permissions(mut self) -> Self {
        let state = self.state.get_mut();
        state.foreground_granted = true;
        state.background_granted = true;
        self
    }

    /// Deliver one fix to the registered sink.
    pub async fn push_fix(&self, fix: Fix) -> Result<()> {
        let sink = {
            let state = self.state.lock().await;
            if !state.running {
                bail!("no location subscription registered");
            }
            state.sink.clone()
        };

        match sink {
            Some(sink) => {
                sink.send(fix).await?;
                Ok(())
            }
            None => bail!("subscription has no sink"),
        }
    }

    /// Config applied by the most recent `start_updates`.
    pub async fn current_config(&self) -> Option<SubscriptionConfig> {
        self.state.lock().await.config
    }

    /// How many times the subscription was (re)registered.
    pub async fn start_count(&self) -> u32 {
        self.state.lock().await.start_count
    }
}

impl Default for ReplayProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for ReplayProvider {
    fn is_physical_device(&self) -> bool {
        self.physical
    }

    async fn start_updates(
        &self,
        config: SubscriptionConfig,
        sink: mpsc::Sender<Fix>,
    ) -> Result<()> {
        let script = {
            let mut state = self.state.lock().await;
            state.running = true;
            state.config = Some(config);
            state.sink = Some(sink.clone());
            state.start_count += 1;
            // Replay the script only on the first registration; mode
            // restarts keep the same logical stream.
            if state.start_count == 1 {
                std::mem::take(&mut state.script)
            } else {
                Vec::new()
            }
        };

        if !script.is_empty() {
            info!("replaying {} scripted fixes", script.len());
            let interval = self.script_interval;
            tokio::spawn(async move {
                for fix in script {
                    if sink.send(fix).await.is_err() {
                        break;
                    }
                    if !interval.is_zero() {
                        tokio::time::sleep(interval).await;
                    }
                }
            });
        }

        Ok(())
    }

    async fn stop_updates(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.running = false;
        state.sink = None;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    async fn permission_status(&self) -> PermissionStatus {
        let state = self.state.lock().await;
        PermissionStatus::new(state.foreground_granted, state.background_granted)
    }

    async fn request_permissions(&self) -> PermissionStatus {
        let mut state = self.state.lock().await;
        // Foreground first; background only makes sense once it succeeded.
        if self.grant_on_request {
            state.foreground_granted = true;
            state.background_granted = true;
        }
        PermissionStatus::new(state.foreground_granted, state.background_granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_fix_requires_a_subscription() {
        let provider = ReplayProvider::new();
        let fix = Fix {
            latitude: 19.07,
            longitude: 72.87,
            accuracy: None,
            speed: None,
        };
        assert!(provider.push_fix(fix).await.is_err());
    }

    #[tokio::test]
    async fn permissions_denied_until_requested() {
        let provider = ReplayProvider::new();
        assert!(!provider.permission_status().await.granted);

        let status = provider.request_permissions().await;
        assert!(status.granted && status.foreground && status.background);
    }

    #[tokio::test]
    async fn denied_prompt_leaves_permissions_ungranted() {
        let provider = ReplayProvider::new().deny_permissions();
        let status = provider.request_permissions().await;
        assert!(!status.granted);
    }
}
