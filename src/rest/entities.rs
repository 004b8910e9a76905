// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity endpoints: generic CRUD plus the per-type listings.

use serde::Serialize;
use uuid::Uuid;

use super::RestClient;
use crate::entity::{
    Asset, Customer, Dashboard, Device, DeviceCredentials, DeviceProfile, EntityId, EntityRelation,
    EntityType, RelationTypeGroup, RuleChain, RuleChainData, TbEntity, Tenant, TenantProfile, User,
    WidgetType, WidgetsBundle,
};
use crate::error::{ParseError, Result};

fn encode(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

fn type_filter(key: &str, value: Option<&str>) -> String {
    value
        .map(|v| format!("&{key}={}", encode(v)))
        .unwrap_or_default()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateRequest<'a> {
    activate_token: &'a str,
    password: &'a str,
}

impl RestClient {
    // ========================================================================
    // Generic CRUD
    // ========================================================================

    /// Fetches an entity by UUID; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_entity<T: TbEntity>(&self, id: Uuid) -> Result<Option<T>> {
        self.get_optional(&format!("/api/{}/{id}", T::ENTITY_TYPE.api_segment()))
            .await
    }

    /// Creates or updates an entity and returns the stored version.
    ///
    /// Entities without id are created; users are created without sending
    /// an activation mail.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if it rejects the entity.
    pub async fn save_entity<T: TbEntity>(&self, entity: &T) -> Result<T> {
        let mut path = format!("/api/{}", T::ENTITY_TYPE.api_segment());
        if T::ENTITY_TYPE == EntityType::User {
            path.push_str("?sendActivationMail=false");
        }
        tracing::debug!(entity_type = %T::ENTITY_TYPE, name = %entity.name(), "Saving entity");
        self.post_json(&path, entity).await
    }

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ProtocolError::Status`] if the platform refuses,
    /// e.g. with 404 for unknown ids.
    pub async fn delete_entity(&self, entity_type: EntityType, id: Uuid) -> Result<()> {
        tracing::debug!(entity_type = %entity_type, %id, "Deleting entity");
        self.delete(&format!("/api/{}/{id}", entity_type.api_segment()))
            .await
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Looks up a tenant device by its unique name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_device(&self, name: &str) -> Result<Option<Device>> {
        self.get_optional(&format!("/api/tenant/devices?deviceName={}", encode(name)))
            .await
    }

    /// Lists all tenant devices, optionally restricted to one profile name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_devices(&self, profile: Option<&str>) -> Result<Vec<Device>> {
        self.get_all_pages("/api/tenant/devices", &type_filter("type", profile))
            .await
    }

    /// Fetches the credentials of a device.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_device_credentials(&self, device_id: Uuid) -> Result<Option<DeviceCredentials>> {
        self.get_optional(&format!("/api/device/{device_id}/credentials"))
            .await
    }

    /// Lists all device profiles.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_device_profiles(&self) -> Result<Vec<DeviceProfile>> {
        self.get_all_pages("/api/deviceProfiles", "").await
    }

    /// Finds a device profile by name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn find_device_profile(&self, name: &str) -> Result<Option<DeviceProfile>> {
        Ok(self
            .get_device_profiles()
            .await?
            .into_iter()
            .rfind(|p| p.name == name))
    }

    // ========================================================================
    // Dashboards, widgets, customers, users, tenants
    // ========================================================================

    /// Lists the tenant's dashboards (without their configuration).
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_dashboards(&self) -> Result<Vec<Dashboard>> {
        self.get_all_pages("/api/tenant/dashboards", "").await
    }

    /// Lists all widgets bundles visible to the user.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_widgets_bundles(&self) -> Result<Vec<WidgetsBundle>> {
        self.get_json("/api/widgetsBundles").await
    }

    /// Lists the widget types of a bundle.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_bundle_widget_types(
        &self,
        bundle_alias: &str,
        is_system: bool,
    ) -> Result<Vec<WidgetType>> {
        self.get_json(&format!(
            "/api/widgetTypes?isSystem={is_system}&bundleAlias={}",
            encode(bundle_alias)
        ))
        .await
    }

    /// Lists the tenant's customers.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_customers(&self) -> Result<Vec<Customer>> {
        self.get_all_pages("/api/customers", "").await
    }

    /// Lists the users visible to the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_users(&self) -> Result<Vec<User>> {
        self.get_all_pages("/api/users", "").await
    }

    /// Lists all tenants (system administrator only).
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenants(&self) -> Result<Vec<Tenant>> {
        self.get_all_pages("/api/tenants", "").await
    }

    /// Lists all tenant profiles (system administrator only).
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_profiles(&self) -> Result<Vec<TenantProfile>> {
        self.get_all_pages("/api/tenantProfiles", "").await
    }

    /// Returns the activation link of a freshly created user.
    ///
    /// # Errors
    ///
    /// Returns transport errors.
    pub async fn get_activation_link(&self, user_id: Uuid) -> Result<String> {
        self.get_text(&format!("/api/user/{user_id}/activationLink"))
            .await
    }

    /// Activates a user with the token of its activation link.
    ///
    /// # Errors
    ///
    /// Returns the platform's error for unknown tokens.
    pub async fn activate_user(&self, activate_token: &str, password: &str) -> Result<()> {
        self.post_unit(
            "/api/noauth/activate?sendActivationMail=false",
            &ActivateRequest {
                activate_token,
                password,
            },
        )
        .await
    }

    /// Activates a user from its activation link.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] if the link carries no token.
    pub async fn activate_user_from_link(&self, link: &str, password: &str) -> Result<()> {
        let token = link
            .split_once("activateToken=")
            .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ParseError::MissingField("activateToken".to_string()))?;
        self.activate_user(token, password).await
    }

    // ========================================================================
    // Rule chains, assets
    // ========================================================================

    /// Lists the tenant's rule chains.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_rule_chains(&self) -> Result<Vec<RuleChain>> {
        self.get_all_pages("/api/ruleChains", "").await
    }

    /// Exports up to `limit` rule chains together with their metadata.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn export_rule_chains(&self, limit: u32) -> Result<RuleChainData> {
        self.get_json(&format!("/api/ruleChains/export?limit={limit}"))
            .await
    }

    /// Imports rule chains, replacing chains of the same name when
    /// `overwrite` is set.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the import is rejected.
    pub async fn import_rule_chains(&self, data: &RuleChainData, overwrite: bool) -> Result<()> {
        tracing::debug!(chains = data.rule_chains.len(), overwrite, "Importing rule chains");
        self.post_unit(&format!("/api/ruleChains/import?overwrite={overwrite}"), data)
            .await
    }

    /// Looks up a tenant asset by its unique name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_asset(&self, name: &str) -> Result<Option<Asset>> {
        self.get_optional(&format!("/api/tenant/assets?assetName={}", encode(name)))
            .await
    }

    /// Lists tenant assets, optionally restricted to one asset type.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_tenant_assets(&self, asset_type: Option<&str>) -> Result<Vec<Asset>> {
        self.get_all_pages("/api/tenant/assets", &type_filter("type", asset_type))
            .await
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Creates or updates a relation.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if an endpoint does not exist.
    pub async fn save_relation(&self, relation: &EntityRelation) -> Result<()> {
        self.post_unit("/api/relation", relation).await
    }

    /// Deletes a relation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ProtocolError::Status`] with 404 if it does not
    /// exist.
    pub async fn delete_relation(&self, relation: &EntityRelation) -> Result<()> {
        self.delete(&format!(
            "/api/relation?{}&relationType={}&relationTypeGroup={}",
            endpoints_query(relation.from, relation.to),
            encode(&relation.relation_type),
            relation.type_group.as_str()
        ))
        .await
    }

    /// Fetches one relation.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_relation(
        &self,
        from: EntityId,
        relation_type: &str,
        group: RelationTypeGroup,
        to: EntityId,
    ) -> Result<Option<EntityRelation>> {
        self.get_optional(&format!(
            "/api/relation?{}&relationType={}&relationTypeGroup={}",
            endpoints_query(from, to),
            encode(relation_type),
            group.as_str()
        ))
        .await
    }

    /// Lists relations starting at `from`, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn find_relations_from(
        &self,
        from: EntityId,
        relation_type: Option<&str>,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        self.get_json(&format!(
            "/api/relations?fromId={}&fromType={}&relationTypeGroup={}{}",
            from.id,
            from.entity_type,
            group.as_str(),
            type_filter("relationType", relation_type)
        ))
        .await
    }

    /// Lists relations ending at `to`, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn find_relations_to(
        &self,
        to: EntityId,
        relation_type: Option<&str>,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        self.get_json(&format!(
            "/api/relations?toId={}&toType={}&relationTypeGroup={}{}",
            to.id,
            to.entity_type,
            group.as_str(),
            type_filter("relationType", relation_type)
        ))
        .await
    }
}

fn endpoints_query(from: EntityId, to: EntityId) -> String {
    format!(
        "fromId={}&fromType={}&toId={}&toType={}",
        from.id, from.entity_type, to.id, to.entity_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_type_filter() {
        assert_eq!(type_filter("type", None), "");
        assert_eq!(type_filter("type", Some("press line")), "&type=press%20line");
    }

    #[test]
    fn relation_endpoints_query() {
        let from = EntityId::new(EntityType::Asset, Uuid::nil());
        let to = EntityId::device(Uuid::nil());
        let query = endpoints_query(from, to);
        assert!(query.starts_with("fromId=00000000-0000-0000-0000-000000000000&fromType=ASSET"));
        assert!(query.ends_with("&toType=DEVICE"));
    }
}
