// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic discovery of the devices of a profile.
//!
//! Every run lists the devices of one device profile and splits them by the
//! server-side `active` attribute the platform maintains. The two lists are
//! handed to the active and inactive handlers, empty lists included.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use tbkit::discovery::DeviceDiscovery;
//! use tbkit::{RestClient, TbConfig};
//!
//! # async fn example() -> tbkit::Result<()> {
//! let rest = RestClient::connect(&TbConfig::from_env()?).await?;
//!
//! let handle = DeviceDiscovery::new(rest, "press")
//!     .with_active_handler(|devices| {
//!         for device in devices {
//!             println!("online: {}", device.name);
//!         }
//!     })
//!     .with_inactive_handler(|devices| println!("{} offline", devices.len()))
//!     .start(Duration::from_secs(30));
//!
//! tokio::time::sleep(Duration::from_secs(120)).await;
//! handle.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::entity::{Device, DeviceAttribute};
use crate::error::Result;
use crate::rest::RestClient;

/// Default period between two discovery runs.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

type DevicesHandler = Arc<dyn Fn(&[Device]) + Send + Sync>;

/// Devices of one discovery run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryResult {
    pub active: Vec<Device>,
    pub inactive: Vec<Device>,
}

/// Discovery of the devices of one profile.
pub struct DeviceDiscovery {
    rest: RestClient,
    profile: String,
    on_active: Option<DevicesHandler>,
    on_inactive: Option<DevicesHandler>,
}

impl DeviceDiscovery {
    /// Creates a discovery of the devices of `profile`, without handlers.
    #[must_use]
    pub fn new(rest: RestClient, profile: impl Into<String>) -> Self {
        Self {
            rest,
            profile: profile.into(),
            on_active: None,
            on_inactive: None,
        }
    }

    /// Sets the handler receiving the active devices of every run.
    #[must_use]
    pub fn with_active_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Device]) + Send + Sync + 'static,
    {
        self.on_active = Some(Arc::new(handler));
        self
    }

    /// Sets the handler receiving the inactive devices of every run.
    #[must_use]
    pub fn with_inactive_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Device]) + Send + Sync + 'static,
    {
        self.on_inactive = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Returns true if the device's `active` attribute is set.
    ///
    /// Devices without id or without the attribute are inactive.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn is_active(&self, device: &Device) -> Result<bool> {
        let Some(id) = device.id else {
            return Ok(false);
        };
        let attribute = DeviceAttribute::ACTIVE;
        let value = self
            .rest
            .get_attribute(id.id, attribute.scope, attribute.name)
            .await?;
        Ok(value.as_ref().is_some_and(is_truthy))
    }

    /// Runs one discovery and calls the handlers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EntityError::NotFound`] if the profile does
    /// not exist, or transport errors.
    pub async fn run_once(&self) -> Result<DiscoveryResult> {
        tracing::debug!(profile = %self.profile, "Querying devices of profile");
        let devices = self.rest.devices_by_profile(&self.profile).await?;
        if devices.is_empty() {
            tracing::debug!(profile = %self.profile, "No devices found");
        }

        let mut result = DiscoveryResult::default();
        for device in devices {
            tracing::debug!(device = %device.name, "Found device");
            if self.is_active(&device).await? {
                result.active.push(device);
            } else {
                result.inactive.push(device);
            }
        }

        if let Some(handler) = &self.on_active {
            handler(&result.active);
        }
        if let Some(handler) = &self.on_inactive {
            handler(&result.inactive);
        }

        tracing::debug!(
            profile = %self.profile,
            active = result.active.len(),
            inactive = result.inactive.len(),
            "Discovery run completed"
        );
        Ok(result)
    }

    /// Runs discovery every `interval` in a background task, starting now.
    ///
    /// Failed runs are logged and retried at the next tick.
    #[must_use]
    pub fn start(self, interval: Duration) -> DiscoveryHandle {
        tracing::info!(
            profile = %self.profile,
            interval_secs = interval.as_secs(),
            "Starting device discovery"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::warn!(profile = %self.profile, error = %e, "Device discovery failed");
                }
            }
        });

        DiscoveryHandle { task }
    }
}

impl std::fmt::Debug for DeviceDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDiscovery")
            .field("profile", &self.profile)
            .field("has_active_handler", &self.on_active.is_some())
            .field("has_inactive_handler", &self.on_inactive.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle of a running discovery. Dropping it leaves the task running.
#[derive(Debug)]
pub struct DiscoveryHandle {
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Stops the discovery task.
    pub fn stop(&self) {
        tracing::info!("Stopping device discovery");
        self.task.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
