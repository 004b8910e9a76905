// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Safe removal of entities, including cascades and duplicate cleanup.
//!
//! A 4xx answer to a delete request means the entity does not exist (any
//! more); the `*_if_exist*` operations report it as `false` instead of
//! failing.

use std::marker::PhantomData;

use uuid::Uuid;

use super::finder::{EntityFinder, Findable, Finder, RelationFinder, WidgetFinder};
use crate::entity::{
    Asset, Customer, Dashboard, Device, DeviceProfile, EntityId, EntityRelation, EntityType,
    RelationDirection, RelationTypeGroup, RuleChain, TbEntity, TenantProfile, User, WidgetType,
    WidgetsBundle,
};
use crate::error::Result;
use crate::rest::RestClient;

/// Removal of one entity kind.
#[allow(async_fn_in_trait)]
pub trait Remover {
    /// Entity removed by this remover.
    type Entity;

    /// Deletes the entity with this UUID.
    ///
    /// # Errors
    ///
    /// Returns the platform's error, e.g. 404 for unknown ids.
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// Fetches the entity with this UUID.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>>;

    /// Deletes the entity if it exists.
    ///
    /// Returns `false` when the platform answers with a client error.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    async fn remove_if_exist_by_id(&self, id: Uuid) -> Result<bool> {
        match self.remove(id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_client_error() => {
                tracing::debug!(%id, error = %e, "Nothing to remove");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Looks up the entity and deletes it.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the found entity cannot be deleted.
    async fn find_and_remove_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>> {
        let Some(entity) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        self.remove(id).await?;
        Ok(Some(entity))
    }
}

/// Result of removing a device profile with all its devices.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedDeviceProfile {
    pub profile: DeviceProfile,
    pub devices: Vec<Device>,
}

/// Result of removing a rule chain with the device profiles using it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedRuleChain {
    pub rule_chain: RuleChain,
    pub device_profiles: Vec<RemovedDeviceProfile>,
}

// ============================================================================
// Entity removers
// ============================================================================

/// Remover of one [`Findable`] entity kind.
pub struct EntityRemover<T> {
    rest: RestClient,
    finder: EntityFinder<T>,
    _kind: PhantomData<fn() -> T>,
}

pub type DeviceRemover = EntityRemover<Device>;
pub type DeviceProfileRemover = EntityRemover<DeviceProfile>;
pub type DashboardRemover = EntityRemover<Dashboard>;
pub type WidgetsBundleRemover = EntityRemover<WidgetsBundle>;
pub type CustomerRemover = EntityRemover<Customer>;
pub type UserRemover = EntityRemover<User>;
pub type TenantProfileRemover = EntityRemover<TenantProfile>;
pub type RuleChainRemover = EntityRemover<RuleChain>;
pub type AssetRemover = EntityRemover<Asset>;

impl<T> EntityRemover<T> {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            finder: EntityFinder::new(rest.clone()),
            rest,
            _kind: PhantomData,
        }
    }
}

impl<T: TbEntity> std::fmt::Debug for EntityRemover<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRemover")
            .field("entity_type", &T::ENTITY_TYPE)
            .finish_non_exhaustive()
    }
}

impl<T: Findable> Remover for EntityRemover<T> {
    type Entity = T;

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.rest.delete_entity(T::ENTITY_TYPE, id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<T>> {
        self.finder.get_by_id(id).await
    }
}

impl<T: Findable> EntityRemover<T> {
    /// Looks up the entity by name and deletes it if it exists.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn find_and_remove_by_name(&self, name: &str) -> Result<Option<T>> {
        let Some(entity) = self.finder.get_by_name(name).await? else {
            return Ok(None);
        };
        if let Some(id) = entity.uuid() {
            self.remove_if_exist_by_id(id).await?;
        }
        Ok(Some(entity))
    }

    /// Removes every other entity with the same identity (name, or title for
    /// titled entities) as the entity `id`, and that entity too unless
    /// `keep_original` is set.
    ///
    /// Returns the removed entities, `None` if `id` does not exist.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_duplicates_by_id(&self, id: Uuid, keep_original: bool) -> Result<Option<Vec<T>>> {
        let Some(original) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut removed: Vec<T> = self
            .finder
            .get_all()
            .await?
            .into_iter()
            .filter(|e| e.uuid() != Some(id) && e.same_identity(&original))
            .collect();
        if !keep_original {
            removed.push(original);
        }

        for entity in &removed {
            if let Some(uuid) = entity.uuid() {
                self.remove_if_exist_by_id(uuid).await?;
            }
        }
        tracing::info!(
            entity_type = %T::ENTITY_TYPE,
            %id,
            removed = removed.len(),
            "Removed duplicates"
        );
        Ok(Some(removed))
    }
}

impl EntityRemover<DeviceProfile> {
    /// Removes a device profile together with all its devices.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_if_exist_cascade_by_id(&self, id: Uuid) -> Result<Option<RemovedDeviceProfile>> {
        let Some(profile) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let devices = EntityFinder::<Device>::new(self.rest.clone())
            .get_all_by_profile(&profile.name)
            .await?;
        let device_remover = EntityRemover::<Device>::new(self.rest.clone());
        for device in &devices {
            if let Some(device_id) = device.uuid() {
                device_remover.remove_if_exist_by_id(device_id).await?;
            }
        }
        self.remove_if_exist_by_id(id).await?;

        tracing::info!(
            profile = %profile.name,
            devices = devices.len(),
            "Removed device profile with its devices"
        );
        Ok(Some(RemovedDeviceProfile { profile, devices }))
    }
}

impl EntityRemover<RuleChain> {
    /// Removes a rule chain together with every device profile using it as
    /// default rule chain (and their devices).
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_if_exist_cascade(&self, id: Uuid) -> Result<Option<RemovedRuleChain>> {
        let Some(rule_chain) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let profile_remover = EntityRemover::<DeviceProfile>::new(self.rest.clone());
        let dependents: Vec<Uuid> = profile_remover
            .finder
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.default_rule_chain_id.is_some_and(|chain| chain.id == id))
            .filter_map(|p| p.uuid())
            .collect();

        let mut device_profiles = Vec::new();
        for profile_id in dependents {
            if let Some(removed) = profile_remover
                .remove_if_exist_cascade_by_id(profile_id)
                .await?
            {
                device_profiles.push(removed);
            }
        }
        self.remove_if_exist_by_id(id).await?;

        Ok(Some(RemovedRuleChain {
            rule_chain,
            device_profiles,
        }))
    }
}

// ============================================================================
// Widget types
// ============================================================================

/// Remover of widget types. Duplicates are searched within the bundle.
#[derive(Debug, Clone)]
pub struct WidgetRemover {
    rest: RestClient,
    widgets: WidgetFinder,
    bundles: EntityFinder<WidgetsBundle>,
}

impl WidgetRemover {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            widgets: WidgetFinder::new(rest.clone()),
            bundles: EntityFinder::new(rest.clone()),
            rest,
        }
    }

    /// Looks up a widget by bundle title and name and deletes it.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn find_and_remove_by_name(
        &self,
        bundle_title: &str,
        name: &str,
    ) -> Result<Option<WidgetType>> {
        let Some(widget) = self
            .widgets
            .get_by_bundle_title_and_name(bundle_title, name, false)
            .await?
        else {
            return Ok(None);
        };
        if let Some(id) = widget.uuid() {
            self.remove_if_exist_by_id(id).await?;
        }
        Ok(Some(widget))
    }

    /// Removes the other widgets of the same name in the widget's bundle, and
    /// the widget itself unless `keep_original` is set.
    ///
    /// Returns `None` if the widget or its bundle does not exist.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_duplicates_by_id(
        &self,
        id: Uuid,
        keep_original: bool,
    ) -> Result<Option<Vec<WidgetType>>> {
        let Some(original) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let bundle = self
            .bundles
            .get_all()
            .await?
            .into_iter()
            .find(|b| Some(&b.alias) == original.bundle_alias.as_ref());
        let Some(bundle) = bundle else {
            return Ok(None);
        };

        let mut removed: Vec<WidgetType> = self
            .widgets
            .get_all(&bundle, false)
            .await?
            .into_iter()
            .filter(|w| w.id.map(|i| i.id) != Some(id) && w.name == original.name)
            .collect();
        if !keep_original {
            removed.push(original);
        }

        for widget in &removed {
            if let Some(uuid) = widget.uuid() {
                self.remove_if_exist_by_id(uuid).await?;
            }
        }
        Ok(Some(removed))
    }
}

impl Remover for WidgetRemover {
    type Entity = WidgetType;

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.rest.delete_entity(EntityType::WidgetType, id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WidgetType>> {
        self.widgets.get_by_id(id).await
    }
}

// ============================================================================
// Relations
// ============================================================================

/// Remover of relations.
#[derive(Debug, Clone)]
pub struct RelationRemover {
    rest: RestClient,
    finder: RelationFinder,
}

impl RelationRemover {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            finder: RelationFinder::new(rest.clone()),
            rest,
        }
    }

    /// Removes all relations between two entities.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_all_between(
        &self,
        first: EntityId,
        second: EntityId,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let relations = self.finder.get_all_between(first, second, group).await?;
        self.remove_each(relations).await
    }

    /// Removes all relations of an entity in the given direction.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_all(
        &self,
        entity: EntityId,
        direction: RelationDirection,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let relations = self
            .finder
            .get_all_by_entity(entity, direction, group)
            .await?;
        self.remove_each(relations).await
    }

    /// Removes the relations of one type of an entity.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_by_type(
        &self,
        entity: EntityId,
        direction: RelationDirection,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let relations = self
            .finder
            .get_all_by_type(entity, direction, relation_type, group)
            .await?;
        self.remove_each(relations).await
    }

    /// Removes the relations of one type between two entities.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_between_by_type(
        &self,
        first: EntityId,
        second: EntityId,
        relation_type: &str,
        group: RelationTypeGroup,
    ) -> Result<Vec<EntityRelation>> {
        let relations = self
            .finder
            .get_all_between(first, second, group)
            .await?
            .into_iter()
            .filter(|r| r.relation_type == relation_type)
            .collect();
        self.remove_each(relations).await
    }

    /// Deletes a relation.
    ///
    /// # Errors
    ///
    /// Returns the platform's error, e.g. 404 if it does not exist.
    pub async fn remove(&self, relation: &EntityRelation) -> Result<()> {
        self.rest.delete_relation(relation).await
    }

    /// Deletes a relation if it exists.
    ///
    /// # Errors
    ///
    /// Returns transport errors and server-side failures.
    pub async fn remove_if_exist(&self, relation: &EntityRelation) -> Result<bool> {
        match self.remove(relation).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_client_error() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn remove_each(&self, relations: Vec<EntityRelation>) -> Result<Vec<EntityRelation>> {
        for relation in &relations {
            self.remove_if_exist(relation).await?;
        }
        Ok(relations)
    }
}

// ============================================================================
// All removers
// ============================================================================

/// Removers of every supported entity kind, sharing one client.
#[derive(Debug)]
pub struct TbRemover {
    pub device: DeviceRemover,
    pub device_profile: DeviceProfileRemover,
    pub dashboard: DashboardRemover,
    pub widgets_bundle: WidgetsBundleRemover,
    pub customer: CustomerRemover,
    pub user: UserRemover,
    pub tenant_profile: TenantProfileRemover,
    pub rule_chain: RuleChainRemover,
    pub widget: WidgetRemover,
    pub asset: AssetRemover,
    pub relation: RelationRemover,
}

impl TbRemover {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            device: EntityRemover::new(rest.clone()),
            device_profile: EntityRemover::new(rest.clone()),
            dashboard: EntityRemover::new(rest.clone()),
            widgets_bundle: EntityRemover::new(rest.clone()),
            customer: EntityRemover::new(rest.clone()),
            user: EntityRemover::new(rest.clone()),
            tenant_profile: EntityRemover::new(rest.clone()),
            rule_chain: EntityRemover::new(rest.clone()),
            widget: WidgetRemover::new(rest.clone()),
            asset: EntityRemover::new(rest.clone()),
            relation: RelationRemover::new(rest),
        }
    }
}
