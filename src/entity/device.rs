// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, impl_tb_entity};

/// A device.
///
/// `device_type` holds the name of the device profile; the platform keeps it
/// in sync with `device_profile_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Id, absent for devices not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Unique device name.
    pub name: String,
    /// Device profile name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Device profile reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_profile_id: Option<EntityId>,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Remaining properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// Creates an unsaved device of the given profile.
    #[must_use]
    pub fn new(name: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: Some(profile.into()),
            ..Self::default()
        }
    }

    /// Returns the profile name, if known.
    #[must_use]
    pub fn profile_name(&self) -> Option<&str> {
        self.device_type.as_deref()
    }
}

impl_tb_entity!(Device, Device, name);

/// A device profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    /// Id, absent for profiles not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Unique profile name.
    pub name: String,
    /// Rule chain processing the messages of devices with this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule_chain_id: Option<EntityId>,
    /// Remaining properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(DeviceProfile, DeviceProfile, name);

/// Credentials of a device. For access-token devices `credentials_id` is the
/// token used as MQTT user name and in device API paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredentials {
    /// Id of the credentials record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Device the credentials belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<EntityId>,
    /// Credentials kind, e.g. `ACCESS_TOKEN`.
    pub credentials_type: String,
    /// Access token (or certificate hash).
    pub credentials_id: String,
    /// Optional credentials payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_value: Option<String>,
    /// Remaining properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, TbEntity};

    #[test]
    fn device_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": {"entityType": "DEVICE", "id": "2b8b2a10-7c2a-11ee-b962-0242ac120002"},
            "name": "press-1",
            "type": "press",
            "deviceProfileId": {"entityType": "DEVICE_PROFILE", "id": "1d2c5a10-7c2a-11ee-b962-0242ac120002"},
            "createdTime": 1_700_000_000_000_i64,
            "additionalInfo": {"description": "line 4"}
        });

        let device: Device = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(device.profile_name(), Some("press"));
        assert_eq!(
            device.device_profile_id.map(|id| id.entity_type),
            Some(EntityType::DeviceProfile)
        );

        let back = serde_json::to_value(&device).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn cleared_id_is_omitted() {
        let mut device = Device::new("press-1", "press");
        device.set_id(None);
        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["type"], "press");
    }

    #[test]
    fn null_id_reads_as_none() {
        let profile: DeviceProfile =
            serde_json::from_value(serde_json::json!({"id": null, "name": "default"})).unwrap();
        assert!(profile.id().is_none());
    }
}
