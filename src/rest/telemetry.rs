// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telemetry, attributes and device provisioning.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::RestClient;
use crate::entity::{AttributeKv, Device, DeviceCredentials, EntityType, Scope};
use crate::error::{EntityError, ProtocolError, Result};

/// Extra time granted to the HTTP request on top of a long-poll timeout.
const LONG_POLL_MARGIN: Duration = Duration::from_secs(5);

fn single(key: &str, value: impl Serialize) -> Result<Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(Value::Object(map))
}

impl RestClient {
    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Stores telemetry for a device.
    ///
    /// `telemetry` is either a flat `{"key": value}` object or
    /// `{"ts": …, "values": {…}}` for an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the payload is rejected.
    pub async fn send_telemetry(&self, device_id: Uuid, telemetry: &Value) -> Result<()> {
        self.post_unit(
            &format!(
                "/api/plugins/telemetry/DEVICE/{device_id}/timeseries/{}",
                Scope::ClientScope
            ),
            telemetry,
        )
        .await
    }

    /// Stores a single telemetry value.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the payload is rejected.
    pub async fn send_telemetry_value(
        &self,
        device_id: Uuid,
        key: &str,
        value: impl Serialize,
    ) -> Result<()> {
        self.send_telemetry(device_id, &single(key, value)?).await
    }

    /// Returns the latest telemetry values of the given keys.
    ///
    /// The result maps each key to its `[{"ts": …, "value": …}]` entries.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_latest_telemetry(
        &self,
        device_id: Uuid,
        keys: &[&str],
    ) -> Result<Map<String, Value>> {
        self.get_json(&format!(
            "/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries?keys={}",
            urlencoding::encode(&keys.join(","))
        ))
        .await
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Reads attributes of one scope. An empty `keys` slice returns all.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_attributes(
        &self,
        device_id: Uuid,
        scope: Scope,
        keys: &[&str],
    ) -> Result<Vec<AttributeKv>> {
        let mut path =
            format!("/api/plugins/telemetry/DEVICE/{device_id}/values/attributes/{scope}");
        if !keys.is_empty() {
            path.push_str("?keys=");
            path.push_str(&urlencoding::encode(&keys.join(",")));
        }
        self.get_json(&path).await
    }

    /// Reads a single attribute value; `None` if it is not set.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_attribute(
        &self,
        device_id: Uuid,
        scope: Scope,
        key: &str,
    ) -> Result<Option<Value>> {
        Ok(self
            .get_attributes(device_id, scope, &[key])
            .await?
            .into_iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value))
    }

    /// Writes a single attribute.
    ///
    /// # Errors
    ///
    /// See [`RestClient::save_attributes`].
    pub async fn save_attribute(
        &self,
        device_id: Uuid,
        scope: Scope,
        key: &str,
        value: impl Serialize,
    ) -> Result<()> {
        self.save_attributes(device_id, scope, &single(key, value)?)
            .await
    }

    /// Writes several attributes of one scope.
    ///
    /// Client attributes can only be reported by the device itself, so they
    /// are sent through the device API using the device's access token.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if a client-scope write targets a
    /// device without credentials, or the platform's error.
    pub async fn save_attributes(&self, device_id: Uuid, scope: Scope, attributes: &Value) -> Result<()> {
        match scope {
            Scope::ClientScope => self.save_client_attributes(device_id, attributes).await,
            Scope::ServerScope | Scope::SharedScope => {
                self.post_unit(
                    &format!("/api/plugins/telemetry/{device_id}/{scope}"),
                    attributes,
                )
                .await
            }
        }
    }

    /// Reports client attributes on behalf of a device.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if the device has no access token.
    pub async fn save_client_attributes(&self, device_id: Uuid, attributes: &Value) -> Result<()> {
        let token = self.require_token(device_id).await?;
        self.post_unit(&format!("/api/v1/{token}/attributes"), attributes)
            .await
    }

    /// Long-polls the device API for shared attribute changes.
    ///
    /// Returns an empty map when nothing changed within `timeout`.
    /// WebSocket subscriptions ([`crate::ws::WsClient`]) are preferred.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if the device has no access token.
    pub async fn wait_for_attribute_changes(
        &self,
        device_id: Uuid,
        timeout: Duration,
    ) -> Result<Map<String, Value>> {
        let token = self.require_token(device_id).await?;
        let path = format!(
            "/api/v1/{token}/attributes/updates?timeout={}",
            timeout.as_millis()
        );

        let result = self
            .send_raw(Method::GET, &path, |request| {
                request.timeout(timeout + LONG_POLL_MARGIN)
            })
            .await;

        match result {
            Ok(body) if body.trim().is_empty() => Ok(Map::new()),
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(crate::Error::Protocol(ProtocolError::Status { status: 408, .. })) => Ok(Map::new()),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Devices and credentials
    // ========================================================================

    /// Returns the device with this name, creating or re-assigning it so that
    /// it uses `profile`.
    ///
    /// - An existing device with this profile is returned unchanged.
    /// - An existing device with another profile is moved to `profile`.
    /// - Otherwise a new device is created.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if an existing device should be moved
    /// to a profile that does not exist.
    pub async fn get_or_create_device(&self, name: &str, profile: &str) -> Result<Device> {
        match self.get_tenant_device(name).await? {
            Some(device) if device.profile_name() == Some(profile) => Ok(device),
            Some(mut device) => {
                let new_profile =
                    self.find_device_profile(profile)
                        .await?
                        .ok_or_else(|| EntityError::NotFound {
                            entity_type: EntityType::DeviceProfile,
                            name: profile.to_string(),
                        })?;

                tracing::info!(
                    device = %name,
                    from = ?device.profile_name(),
                    to = %profile,
                    "Moving device to another profile"
                );
                device.device_type = Some(profile.to_string());
                device.device_profile_id = new_profile.id;
                self.save_entity(&device).await
            }
            None => {
                tracing::info!(device = %name, profile = %profile, "Creating device");
                self.save_entity(&Device::new(name, profile)).await
            }
        }
    }

    /// Returns the credentials of the named device.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn device_credentials_by_name(&self, name: &str) -> Result<Option<DeviceCredentials>> {
        match self.get_tenant_device(name).await?.and_then(|d| d.id) {
            Some(id) => self.get_device_credentials(id.id).await,
            None => Ok(None),
        }
    }

    /// Returns the access token of a device.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn device_token_by_id(&self, device_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .get_device_credentials(device_id)
            .await?
            .map(|c| c.credentials_id))
    }

    /// Returns the access token of the named device.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn device_token_by_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .device_credentials_by_name(name)
            .await?
            .map(|c| c.credentials_id))
    }

    /// Lists all devices of a profile.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if the profile does not exist.
    pub async fn devices_by_profile(&self, profile: &str) -> Result<Vec<Device>> {
        if self.find_device_profile(profile).await?.is_none() {
            return Err(EntityError::NotFound {
                entity_type: EntityType::DeviceProfile,
                name: profile.to_string(),
            }
            .into());
        }
        self.get_tenant_devices(Some(profile)).await
    }

    async fn require_token(&self, device_id: Uuid) -> Result<String> {
        self.device_token_by_id(device_id)
            .await?
            .ok_or_else(|| {
                EntityError::NotFound {
                    entity_type: EntityType::Device,
                    name: device_id.to_string(),
                }
                .into()
            })
    }
}
