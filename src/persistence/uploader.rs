// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Restoring entities from JSON backup files.
//!
//! Uploads are idempotent: an entity whose name (or title) already exists on
//! the platform takes over the existing id and overwrites it; otherwise the
//! id stored in the file is dropped and a new entity is created.

use std::marker::PhantomData;
use std::path::Path;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::finder::{Findable, TbFinder, WidgetFinder};
use super::loader::{json_files, read_node};
use super::paths::ConfigPaths;
use crate::entity::{
    Asset, Customer, Dashboard, Device, DeviceProfile, EntityRelation, EntityType, RuleChain,
    RuleChainData, TbEntity, TenantProfile, User, WidgetType, WidgetsBundle,
};
use crate::error::{EntityError, ParseError, Result};
use crate::rest::RestClient;

/// Reads entities from JSON and stores them on the platform.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    /// Entity restored by this uploader.
    type Entity;

    /// Turns a JSON document into an entity ready to be stored, resolving
    /// references to other entities by name.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed documents and
    /// [`EntityError::NotFound`] for unresolved references.
    async fn read(&self, json: Value) -> Result<Self::Entity>;

    /// Stores an entity and returns the stored version.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if it rejects the entity.
    async fn load(&self, entity: Self::Entity) -> Result<Self::Entity>;

    /// Reads the entity of one file.
    ///
    /// # Errors
    ///
    /// See [`read_node`] and [`Uploader::read`].
    async fn read_file(&self, path: &Path) -> Result<Self::Entity> {
        self.read(read_node(path)?).await
    }

    /// Reads and stores one JSON document.
    ///
    /// # Errors
    ///
    /// See [`Uploader::read`] and [`Uploader::load`].
    async fn load_json(&self, json: Value) -> Result<Self::Entity> {
        let entity = self.read(json).await?;
        self.load(entity).await
    }

    /// Reads and stores the entity of one file.
    ///
    /// # Errors
    ///
    /// See [`Uploader::read_file`] and [`Uploader::load`].
    async fn load_file(&self, path: &Path) -> Result<Self::Entity> {
        let entity = self.read_file(path).await?;
        self.load(entity).await
    }

    /// Reads every `*.json` file of a directory.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be read.
    async fn read_all(&self, dir: &Path) -> Result<Vec<Self::Entity>> {
        let mut entities = Vec::new();
        for path in json_files(dir)? {
            entities.push(self.read_file(&path).await?);
        }
        Ok(entities)
    }

    /// Reads and stores every `*.json` file of a directory.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be read or stored.
    async fn load_all(&self, dir: &Path) -> Result<Vec<Self::Entity>> {
        let mut entities = Vec::new();
        for path in json_files(dir)? {
            entities.push(self.load_file(&path).await?);
        }
        Ok(entities)
    }
}

fn deserialize<T: DeserializeOwned>(json: Value) -> Result<T> {
    Ok(serde_json::from_value(json)?)
}

/// Takes over the id of an existing entity of the same name, or clears it.
async fn adopt_existing_id<T: Findable>(rest: &RestClient, entity: &mut T) -> Result<()> {
    let existing = T::lookup(rest, entity.name()).await?.and_then(|e| e.id());
    match existing {
        Some(id) => tracing::debug!(
            entity_type = %T::ENTITY_TYPE,
            name = %entity.name(),
            %id,
            "Overwriting existing entity"
        ),
        None => tracing::debug!(
            entity_type = %T::ENTITY_TYPE,
            name = %entity.name(),
            "Creating entity"
        ),
    }
    entity.set_id(existing);
    Ok(())
}

// ============================================================================
// Generic uploaders
// ============================================================================

/// Upsert by name: dashboards, assets, widgets bundles (by title) and
/// customers (by title).
pub struct UpsertUploader<T> {
    rest: RestClient,
    _kind: PhantomData<fn() -> T>,
}

impl<T> UpsertUploader<T> {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            _kind: PhantomData,
        }
    }
}

impl<T: TbEntity> std::fmt::Debug for UpsertUploader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertUploader")
            .field("entity_type", &T::ENTITY_TYPE)
            .finish_non_exhaustive()
    }
}

impl<T: Findable> Uploader for UpsertUploader<T> {
    type Entity = T;

    async fn read(&self, json: Value) -> Result<T> {
        deserialize(json)
    }

    async fn load(&self, mut entity: T) -> Result<T> {
        adopt_existing_id(&self.rest, &mut entity).await?;
        self.rest.save_entity(&entity).await
    }
}

/// Plain save: users and tenant profiles.
pub struct SaveUploader<T> {
    rest: RestClient,
    _kind: PhantomData<fn() -> T>,
}

impl<T> SaveUploader<T> {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            _kind: PhantomData,
        }
    }
}

impl<T: TbEntity> std::fmt::Debug for SaveUploader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveUploader")
            .field("entity_type", &T::ENTITY_TYPE)
            .finish_non_exhaustive()
    }
}

impl<T: TbEntity> Uploader for SaveUploader<T> {
    type Entity = T;

    async fn read(&self, json: Value) -> Result<T> {
        deserialize(json)
    }

    async fn load(&self, entity: T) -> Result<T> {
        self.rest.save_entity(&entity).await
    }
}

// ============================================================================
// Devices
// ============================================================================

/// Devices: the profile named by `type` must exist; upsert by name.
#[derive(Debug, Clone)]
pub struct DeviceUploader {
    rest: RestClient,
}

impl DeviceUploader {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

impl Uploader for DeviceUploader {
    type Entity = Device;

    async fn read(&self, json: Value) -> Result<Device> {
        let mut device: Device = deserialize(json)?;
        let profile_name = device
            .profile_name()
            .ok_or_else(|| ParseError::MissingField("type".to_string()))?;

        let profile = DeviceProfile::lookup(&self.rest, profile_name)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity_type: EntityType::DeviceProfile,
                name: profile_name.to_string(),
            })?;
        device.device_profile_id = profile.id;
        Ok(device)
    }

    async fn load(&self, mut device: Device) -> Result<Device> {
        adopt_existing_id(&self.rest, &mut device).await?;
        self.rest.save_entity(&device).await
    }
}

// ============================================================================
// Device profiles
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileAdditionalConfigs {
    default_rule_chain: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFile {
    config: DeviceProfile,
    additional_configs: Option<ProfileAdditionalConfigs>,
}

/// Device profiles, stored as
/// `{"config": profile, "additionalConfigs": {"defaultRuleChain": name}}`.
#[derive(Debug, Clone)]
pub struct DeviceProfileUploader {
    rest: RestClient,
}

impl DeviceProfileUploader {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Stores `profile` with `rule_chain` as its default rule chain.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if it rejects the profile.
    pub async fn load_with_rule_chain(
        &self,
        mut profile: DeviceProfile,
        rule_chain: &RuleChain,
    ) -> Result<DeviceProfile> {
        profile.default_rule_chain_id = rule_chain.id;
        self.load(profile).await
    }
}

impl Uploader for DeviceProfileUploader {
    type Entity = DeviceProfile;

    async fn read(&self, json: Value) -> Result<DeviceProfile> {
        let file: ProfileFile = deserialize(json)?;
        let chain_name = file
            .additional_configs
            .and_then(|c| c.default_rule_chain)
            .ok_or_else(|| {
                ParseError::MissingField("additionalConfigs.defaultRuleChain".to_string())
            })?;

        let found = RuleChain::lookup(&self.rest, &chain_name).await?;
        let chain = found.ok_or(EntityError::NotFound {
            entity_type: EntityType::RuleChain,
            name: chain_name,
        })?;

        let mut profile = file.config;
        profile.default_rule_chain_id = chain.id;
        Ok(profile)
    }

    async fn load(&self, mut profile: DeviceProfile) -> Result<DeviceProfile> {
        adopt_existing_id(&self.rest, &mut profile).await?;
        self.rest.save_entity(&profile).await
    }
}

// ============================================================================
// Rule chains
// ============================================================================

/// Rule chains, stored as export bundles `{"ruleChains": [...], "metadata": [...]}`.
///
/// Imports always overwrite chains of the same name.
#[derive(Debug, Clone)]
pub struct RuleChainUploader {
    rest: RestClient,
}

impl RuleChainUploader {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Reads every bundle of a directory into a single one.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be read.
    pub async fn read_all_merged(&self, dir: &Path) -> Result<RuleChainData> {
        let mut merged = RuleChainData::default();
        for data in self.read_all(dir).await? {
            merged.merge(data);
        }
        Ok(merged)
    }
}

impl Uploader for RuleChainUploader {
    type Entity = RuleChainData;

    async fn read(&self, json: Value) -> Result<RuleChainData> {
        deserialize(json)
    }

    async fn load(&self, data: RuleChainData) -> Result<RuleChainData> {
        self.rest.import_rule_chains(&data, true).await?;
        Ok(data)
    }

    /// Merges all bundles and imports them in one request, so chains may
    /// reference chains of other files.
    async fn load_all(&self, dir: &Path) -> Result<Vec<RuleChainData>> {
        let all = self.read_all(dir).await?;
        let mut merged = RuleChainData::default();
        for data in &all {
            merged.merge(data.clone());
        }
        if merged.is_empty() {
            tracing::debug!(dir = %dir.display(), "No rule chains to import");
        } else {
            self.load(merged).await?;
        }
        Ok(all)
    }
}

// ============================================================================
// Widget types
// ============================================================================

/// Widget types, upserted by name inside the current bundle.
///
/// Without a current bundle every widget type is created anew.
#[derive(Debug)]
pub struct WidgetTypeUploader {
    rest: RestClient,
    widgets: WidgetFinder,
    current_bundle: RwLock<Option<WidgetsBundle>>,
}

impl WidgetTypeUploader {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self {
            widgets: WidgetFinder::new(rest.clone()),
            rest,
            current_bundle: RwLock::new(None),
        }
    }

    /// Sets the bundle later uploads are matched against.
    pub fn configure_bundle(&self, bundle: Option<WidgetsBundle>) {
        *self.current_bundle.write() = bundle;
    }

    #[must_use]
    pub fn current_bundle(&self) -> Option<WidgetsBundle> {
        self.current_bundle.read().clone()
    }
}

impl Uploader for WidgetTypeUploader {
    type Entity = WidgetType;

    async fn read(&self, json: Value) -> Result<WidgetType> {
        deserialize(json)
    }

    async fn load(&self, mut widget: WidgetType) -> Result<WidgetType> {
        let existing = match self.current_bundle() {
            Some(bundle) => self
                .widgets
                .get_by_bundle_and_name(&bundle, &widget.name, false)
                .await?
                .and_then(|w| w.id),
            None => None,
        };
        widget.id = existing;
        self.rest.save_entity(&widget).await
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationNames {
    name_from: String,
    name_to: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationFile {
    config: EntityRelation,
    additional_configs: RelationNames,
}

/// Relations, stored as
/// `{"config": relation, "additionalConfigs": {"nameFrom", "nameTo"}}`.
///
/// Both ends are looked up by type and name; ids from the file are replaced.
#[derive(Debug, Clone)]
pub struct RelationUploader {
    finder: TbFinder,
}

impl RelationUploader {
    #[must_use]
    pub fn new(finder: TbFinder) -> Self {
        Self { finder }
    }
}

impl Uploader for RelationUploader {
    type Entity = EntityRelation;

    async fn read(&self, json: Value) -> Result<EntityRelation> {
        let RelationFile {
            mut config,
            additional_configs: names,
        } = deserialize(json)?;

        for (end, name) in [(&mut config.from, names.name_from), (&mut config.to, names.name_to)] {
            let found = self
                .finder
                .find_id_by_type_and_name(end.entity_type, &name)
                .await?;
            *end = found.ok_or(EntityError::NotFound {
                entity_type: end.entity_type,
                name,
            })?;
        }
        Ok(config)
    }

    async fn load(&self, relation: EntityRelation) -> Result<EntityRelation> {
        self.finder.rest().save_relation(&relation).await?;
        Ok(relation)
    }
}

// ============================================================================
// All uploaders
// ============================================================================

/// Uploaders of every supported entity kind, sharing one client.
#[derive(Debug)]
pub struct ConfigUploader {
    pub device: DeviceUploader,
    pub device_profile: DeviceProfileUploader,
    pub dashboard: UpsertUploader<Dashboard>,
    pub asset: UpsertUploader<Asset>,
    pub widgets_bundle: UpsertUploader<WidgetsBundle>,
    pub customer: UpsertUploader<Customer>,
    pub user: SaveUploader<User>,
    pub tenant_profile: SaveUploader<TenantProfile>,
    pub rule_chain: RuleChainUploader,
    pub widget: WidgetTypeUploader,
    pub relation: RelationUploader,
    pub finder: TbFinder,
}

impl ConfigUploader {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        let finder = TbFinder::new(rest.clone());
        Self {
            device: DeviceUploader::new(rest.clone()),
            device_profile: DeviceProfileUploader::new(rest.clone()),
            dashboard: UpsertUploader::new(rest.clone()),
            asset: UpsertUploader::new(rest.clone()),
            widgets_bundle: UpsertUploader::new(rest.clone()),
            customer: UpsertUploader::new(rest.clone()),
            user: SaveUploader::new(rest.clone()),
            tenant_profile: SaveUploader::new(rest.clone()),
            rule_chain: RuleChainUploader::new(rest.clone()),
            widget: WidgetTypeUploader::new(rest),
            relation: RelationUploader::new(finder.clone()),
            finder,
        }
    }

    /// Restores a whole backup directory.
    ///
    /// Kinds are loaded so that references resolve: rule chains, device
    /// profiles, devices, assets, customers, widgets bundles, dashboards,
    /// relations. Missing sub-directories are skipped.
    ///
    /// # Errors
    ///
    /// Fails on the first entity that cannot be restored.
    pub async fn load_config(&self, paths: &ConfigPaths) -> Result<()> {
        if paths.rules.is_dir() {
            self.rule_chain.load_all(&paths.rules).await?;
        }
        if paths.profiles.is_dir() {
            self.device_profile.load_all(&paths.profiles).await?;
        }
        if paths.devices.is_dir() {
            self.device.load_all(&paths.devices).await?;
        }
        if paths.assets.is_dir() {
            self.asset.load_all(&paths.assets).await?;
        }
        if paths.customers.is_dir() {
            self.customer.load_all(&paths.customers).await?;
        }
        if paths.bundles.is_dir() {
            self.widgets_bundle.load_all(&paths.bundles).await?;
        }
        if paths.dashboards.is_dir() {
            self.dashboard.load_all(&paths.dashboards).await?;
        }
        if paths.relations.is_dir() {
            self.relation.load_all(&paths.relations).await?;
        }

        tracing::info!(root = %paths.root.display(), "Configuration restored");
        Ok(())
    }
}
