// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed entity identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a platform entity, as used in ids and REST paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// A tenant.
    Tenant,
    /// A tenant profile.
    TenantProfile,
    /// A customer of a tenant.
    Customer,
    /// A user account.
    User,
    /// A dashboard.
    Dashboard,
    /// An asset.
    Asset,
    /// An asset profile.
    AssetProfile,
    /// A device.
    Device,
    /// A device profile.
    DeviceProfile,
    /// An alarm.
    Alarm,
    /// A rule chain.
    RuleChain,
    /// A node of a rule chain.
    RuleNode,
    /// An entity view.
    EntityView,
    /// A widgets bundle.
    WidgetsBundle,
    /// A widget type.
    WidgetType,
    /// An edge instance.
    Edge,
}

impl EntityType {
    /// Returns the name used by the platform, e.g. `DEVICE_PROFILE`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tenant => "TENANT",
            Self::TenantProfile => "TENANT_PROFILE",
            Self::Customer => "CUSTOMER",
            Self::User => "USER",
            Self::Dashboard => "DASHBOARD",
            Self::Asset => "ASSET",
            Self::AssetProfile => "ASSET_PROFILE",
            Self::Device => "DEVICE",
            Self::DeviceProfile => "DEVICE_PROFILE",
            Self::Alarm => "ALARM",
            Self::RuleChain => "RULE_CHAIN",
            Self::RuleNode => "RULE_NODE",
            Self::EntityView => "ENTITY_VIEW",
            Self::WidgetsBundle => "WIDGETS_BUNDLE",
            Self::WidgetType => "WIDGET_TYPE",
            Self::Edge => "EDGE",
        }
    }

    /// Returns the REST path segment of single-entity endpoints,
    /// e.g. `deviceProfile` for `/api/deviceProfile/{id}`.
    #[must_use]
    pub fn api_segment(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::TenantProfile => "tenantProfile",
            Self::Customer => "customer",
            Self::User => "user",
            Self::Dashboard => "dashboard",
            Self::Asset => "asset",
            Self::AssetProfile => "assetProfile",
            Self::Device => "device",
            Self::DeviceProfile => "deviceProfile",
            Self::Alarm => "alarm",
            Self::RuleChain => "ruleChain",
            Self::RuleNode => "ruleNode",
            Self::EntityView => "entityView",
            Self::WidgetsBundle => "widgetsBundle",
            Self::WidgetType => "widgetType",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a platform entity: its type plus a UUID.
///
/// Serialized the way the platform expects it:
/// `{"entityType": "DEVICE", "id": "…"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityId {
    /// Kind of the referenced entity.
    pub entity_type: EntityType,
    /// UUID of the referenced entity.
    pub id: Uuid,
}

impl EntityId {
    /// Creates a new entity id.
    #[must_use]
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    /// Shorthand for a device id.
    #[must_use]
    pub fn device(id: Uuid) -> Self {
        Self::new(EntityType::Device, id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_wire_format() {
        let id = EntityId::device(Uuid::nil());
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entityType": "DEVICE",
                "id": "00000000-0000-0000-0000-000000000000"
            })
        );
    }

    #[test]
    fn entity_type_names_match_serde() {
        for ty in [
            EntityType::DeviceProfile,
            EntityType::WidgetsBundle,
            EntityType::RuleChain,
            EntityType::TenantProfile,
        ] {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, serde_json::Value::String(ty.as_str().to_string()));
        }
    }

    #[test]
    fn api_segments() {
        assert_eq!(EntityType::DeviceProfile.api_segment(), "deviceProfile");
        assert_eq!(EntityType::WidgetsBundle.api_segment(), "widgetsBundle");
    }
}
