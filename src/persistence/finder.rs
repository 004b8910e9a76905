// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity lookup by id, by name, or all of a kind.
//!
//! Names are not unique on the platform for every entity kind. When several
//! entities share a name, name lookups return the last one listed.

use std::marker::PhantomData;

use uuid::Uuid;

use crate::entity::{
    Asset, Customer, Dashboard, Device, DeviceProfile, EntityId, EntityRelation, EntityType,
    RelationDirection, RelationTypeGroup, RuleChain, RuleChainMetaData, TbEntity, Tenant,
    TenantProfile, User, WidgetType, WidgetsBundle,
};
use crate::error::{EntityError, Result};
use crate::rest::RestClient;

/// Lookup of one entity kind.
#[allow(async_fn_in_trait)]
pub trait Finder {
    /// Entity found by this finder.
    type Entity;

    /// Fetches an entity by UUID.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors; unknown ids give `Ok(None)`.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>>;

    /// Finds the last entity with this name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    async fn get_by_name(&self, name: &str) -> Result<Option<Self::Entity>>;

    /// Lists all entities of the kind.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    async fn get_all(&self) -> Result<Vec<Self::Entity>>;
}

/// An entity kind the platform can list.
#[allow(async_fn_in_trait)]
pub trait Findable: TbEntity {
    /// Lists all entities of this kind.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    async fn list(rest: &RestClient) -> Result<Vec<Self>>;

    /// Finds the last entity named `name`.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    async fn lookup(rest: &RestClient, name: &str) -> Result<Option<Self>> {
        Ok(Self::list(rest)
            .await?
            .into_iter()
            .rfind(|entity| entity.name() == name))
    }
}

impl Findable for Device {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_tenant_devices(None).await
    }

    async fn lookup(rest: &RestClient, name: &str) -> Result<Option<Self>> {
        rest.get_tenant_device(name).await
    }
}

impl Findable for DeviceProfile {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_device_profiles().await
    }
}

impl Findable for Dashboard {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_tenant_dashboards().await
    }

    /// Listings omit the layout, so the match is fetched again in full.
    async fn lookup(rest: &RestClient, name: &str) -> Result<Option<Self>> {
        let info = Self::list(rest).await?.into_iter().rfind(|d| d.title == name);
        match info.and_then(|d| d.uuid()) {
            Some(id) => rest.get_entity(id).await,
            None => Ok(None),
        }
    }
}

impl Findable for WidgetsBundle {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_widgets_bundles().await
    }
}

impl Findable for Customer {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_customers().await
    }
}

impl Findable for User {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_users().await
    }
}

impl Findable for Tenant {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_tenants().await
    }
}

impl Findable for TenantProfile {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_tenant_profiles().await
    }
}

impl Findable for RuleChain {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_rule_chains().await
    }
}

impl Findable for Asset {
    async fn list(rest: &RestClient) -> Result<Vec<Self>> {
        rest.get_tenant_assets(None).await
    }

    async fn lookup(rest: &RestClient, name: &str) -> Result<Option<Self>> {
        rest.get_tenant_asset(name).await
    }
}

// ============================================================================
// Entity finders
// ============================================================================

/// Finder of one [`Findable`] entity kind.
pub struct EntityFinder<T> {
    rest: RestClient,
    _kind: PhantomData<fn() -> T>,
}

pub type DeviceFinder = EntityFinder<Device>;
pub type DeviceProfileFinder = EntityFinder<DeviceProfile>;
pub type DashboardFinder = EntityFinder<Dashboard>;
pub type WidgetsBundleFinder = EntityFinder<WidgetsBundle>;
pub type CustomerFinder = EntityFinder<Customer>;
pub type UserFinder = EntityFinder<User>;
pub type TenantFinder = EntityFinder<Tenant>;
pub type TenantProfileFinder = EntityFinder<TenantProfile>;
pub type RuleChainFinder = EntityFinder<RuleChain>;
pub type AssetFinder = EntityFinder<Asset>;

impl<T> EntityFinder<T> {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            _kind: PhantomData,
        }
    }
}

impl<T> Clone for EntityFinder<T> {
    fn clone(&self) -> Self {
        Self::new(self.rest.clone())
    }
}

impl<T: TbEntity> std::fmt::Debug for EntityFinder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityFinder")
            .field("entity_type", &T::ENTITY_TYPE)
            .finish_non_exhaustive()
    }
}

impl<T: Findable> Finder for EntityFinder<T> {
    type Entity = T;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<T>> {
        self.rest.get_entity(id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<T>> {
        T::lookup(&self.rest, name).await
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        T::list(&self.rest).await
    }
}

impl EntityFinder<Device> {
    /// Lists all devices of a profile.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::NotFound`] if the profile does not exist.
    pub async fn get_all_by_profile(&self, profile: &str) -> Result<Vec<Device>> {
        self.rest.devices_by_profile(profile).await
    }
}

impl EntityFinder<User> {
    /// Finds the last user with this first and last name.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_by_first_and_last_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>> {
        Ok(self.get_all().await?.into_iter().rfind(|user| {
            user.first_name.as_deref() == Some(first_name)
                && user.last_name.as_deref() == Some(last_name)
        }))
    }
}

impl EntityFinder<Asset> {
    /// Lists all assets of one type.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_all_by_type(&self, asset_type: &str) -> Result<Vec<Asset>> {
        self.rest.get_tenant_assets(Some(asset_type)).await
    }
}

// ============================================================================
// Rule chain export bundles
// ============================================================================

/// Upper bound of rule chains fetched per export.
pub const RULE_CHAIN_EXPORT_LIMIT: u32 = 10_000;

/// Finder of rule chains together with their metadata.
///
/// Chains whose metadata is missing from the export are skipped.
#[derive(Debug, Clone)]
pub struct RuleChainDataFinder {
    rest: RestClient,
}

impl RuleChainDataFinder {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl Finder for RuleChainDataFinder {
    type Entity = (RuleChain, RuleChainMetaData);

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .rfind(|(chain, _)| chain.uuid() == Some(id)))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Self::Entity>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .rfind(|(chain, _)| chain.name == name))
    }

    async fn get_all(&self) -> Result<Vec<Self::Entity>> {
        let export = self.rest.export_rule_chains(RULE_CHAIN_EXPORT_LIMIT).await?;

        let pairs = export
            .rule_chains
            .into_iter()
            .filter_map(|chain| {
                let metadata = export
                    .metadata
                    .iter()
                    .rfind(|m| m.rule_chain_id.is_some() && m.rule_chain_id == chain.id)
                    .cloned();
                if metadata.is_none() {
                    tracing::warn!(rule_chain = %chain.name, "Export holds no metadata for rule chain");
                }
                metadata.map(|m| (chain, m))
            })
            .collect();
        Ok(pairs)
    }
}

// ============================================================================
// Widget types
// ============================================================================

/// Finder of widget types. Widget names are only unique inside a bundle.
#[derive(Debug, Clone)]
pub struct WidgetFinder {
    rest: RestClient,
}

impl WidgetFinder {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Fetches a widget type by UUID.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<WidgetType>> {
        self.rest.get_entity(id).await
    }

    /// Finds the last widget named `name` in `bundle`.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_by_bundle_and_name(
        &self,
        bundle: &WidgetsBundle,
        name: &str,
        is_system: bool,
    ) -> Result<Option<WidgetType>> {
        Ok(self
            .get_all(bundle, is_system)
            .await?
            .into_iter()
            .rfind(|w| w.name == name))
    }

    /// Finds the last widget named `name` in the last bundle titled
    /// `bundle_title`.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_by_bundle_title_and_name(
        &self,
        bundle_title: &str,
        name: &str,
        is_system: bool,
    ) -> Result<Option<WidgetType>> {
        match WidgetsBundle::lookup(&self.rest, bundle_title).await? {
            Some(bundle) => self.get_by_bundle_and_name(&bundle, name, is_system).await,
            None => Ok(None),
        }
    }

    /// Lists the widget types of a bundle.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_all(&self, bundle: &WidgetsBundle, is_system: bool) -> Result<Vec<WidgetType>> {
        self.rest.get_bundle_widget_types(&bundle.alias, is_system).await
    }
}

// ============================================================================
// Relations
// ============================================================================

/// Lookup of relations between entities.
#[derive(Debug, Clone)]
pub struct RelationFinder {
    rest: RestClient,
}

impl RelationFinder {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Lists the relations of an entity in the given direction.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_all_by_entity(
        &self,
        entity: EntityId,
        direction: RelationDirection,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        self.collect(entity, direction, None, group).await
    }

    /// Lists the relations of one type of an entity in the given direction.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_all_by_type(
        &self,
        entity: EntityId,
        direction: RelationDirection,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        self.collect(entity, direction, Some(relation_type), group)
            .await
    }

    /// Lists the relations between two entities, in both directions.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_all_between(
        &self,
        first: EntityId,
        second: EntityId,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let mut relations: Vec<_> = self
            .get_all_by_entity(first, RelationDirection::From, group)
            .await?
            .into_iter()
            .filter(|r| r.to.id == second.id)
            .collect();
        relations.extend(
            self.get_all_by_entity(second, RelationDirection::From, group)
                .await?
                .into_iter()
                .filter(|r| r.to.id == first.id),
        );
        Ok(relations)
    }

    /// Fetches the single relation of `relation_type` between `source` and
    /// `target`.
    ///
    /// `From` looks for `source -> target`, `To` for `target -> source`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::InvalidArgument`] for [`RelationDirection::Both`].
    pub async fn get(
        &self,
        source: EntityId,
        target: EntityId,
        direction: RelationDirection,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Option<EntityRelation>> {
        let (from, to) = match direction {
            RelationDirection::From => (source, target),
            RelationDirection::To => (target, source),
            RelationDirection::Both => {
                return Err(EntityError::InvalidArgument(
                    "a single relation lookup needs a FROM or TO direction".to_string(),
                )
                .into());
            }
        };
        self.rest.get_relation(from, relation_type, group, to).await
    }

    /// Fetches the relation `source -> target`.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_from(
        &self,
        source: EntityId,
        target: EntityId,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Option<EntityRelation>> {
        self.get(source, target, RelationDirection::From, relation_type, group)
            .await
    }

    /// Fetches the relation `target -> source`.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_to(
        &self,
        source: EntityId,
        target: EntityId,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Option<EntityRelation>> {
        self.get(source, target, RelationDirection::To, relation_type, group)
            .await
    }

    async fn collect(
        &self,
        entity: EntityId,
        direction: RelationDirection,
        relation_type: Option<&str>,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let mut relations = Vec::new();
        if direction.is_to() {
            relations.extend(self.rest.find_relations_to(entity, relation_type, group).await?);
        }
        if direction.is_from() {
            relations.extend(
                self.rest
                    .find_relations_from(entity, relation_type, group)
                    .await?,
            );
        }
        Ok(relations)
    }
}

// ============================================================================
// All finders
// ============================================================================

/// Finders of every supported entity kind, sharing one client.
#[derive(Debug, Clone)]
pub struct TbFinder {
    pub device: DeviceFinder,
    pub device_profile: DeviceProfileFinder,
    pub dashboard: DashboardFinder,
    pub widgets_bundle: WidgetsBundleFinder,
    pub customer: CustomerFinder,
    pub user: UserFinder,
    pub tenant: TenantFinder,
    pub tenant_profile: TenantProfileFinder,
    pub rule_chain: RuleChainFinder,
    pub rule_chain_data: RuleChainDataFinder,
    pub widget: WidgetFinder,
    pub asset: AssetFinder,
    pub relations: RelationFinder,
    rest: RestClient,
}

impl TbFinder {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            device: EntityFinder::new(rest.clone()),
            device_profile: EntityFinder::new(rest.clone()),
            dashboard: EntityFinder::new(rest.clone()),
            widgets_bundle: EntityFinder::new(rest.clone()),
            customer: EntityFinder::new(rest.clone()),
            user: EntityFinder::new(rest.clone()),
            tenant: EntityFinder::new(rest.clone()),
            tenant_profile: EntityFinder::new(rest.clone()),
            rule_chain: EntityFinder::new(rest.clone()),
            rule_chain_data: RuleChainDataFinder::new(rest.clone()),
            widget: WidgetFinder::new(rest.clone()),
            asset: EntityFinder::new(rest.clone()),
            relations: RelationFinder::new(rest.clone()),
            rest,
        }
    }

    #[must_use]
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Resolves the id of the entity of `entity_type` named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::Unsupported`] for entity kinds without a name
    /// lookup (alarms, rule nodes, ...).
    pub async fn find_id_by_type_and_name(
        &self,
        entity_type: EntityType,
        name: &str,
    ) -> Result<Option<EntityId>> {
        let id = match entity_type {
            EntityType::Asset => self.asset.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::Customer => self.customer.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::Tenant => self.tenant.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::TenantProfile => self
                .tenant_profile
                .get_by_name(name)
                .await?
                .and_then(|e| e.id),
            EntityType::User => self.user.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::Dashboard => self.dashboard.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::Device => self.device.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::DeviceProfile => self
                .device_profile
                .get_by_name(name)
                .await?
                .and_then(|e| e.id),
            EntityType::RuleChain => self.rule_chain.get_by_name(name).await?.and_then(|e| e.id),
            EntityType::WidgetsBundle => self
                .widgets_bundle
                .get_by_name(name)
                .await?
                .and_then(|e| e.id),
            other => return Err(EntityError::Unsupported(other).into()),
        };
        Ok(id)
    }
}
