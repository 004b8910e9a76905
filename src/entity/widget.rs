// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, EntityType, TbEntity, impl_tb_entity};

/// A widgets bundle. Bundles are identified by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetsBundle {
    /// Id, absent for bundles not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Bundle title.
    pub title: String,
    /// Bundle alias referenced by its widget types.
    #[serde(default)]
    pub alias: String,
    /// Remaining properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(WidgetsBundle, WidgetsBundle, title);

/// A widget type, living inside a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetType {
    /// Id, absent for widget types not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Widget name.
    pub name: String,
    /// Alias of the owning bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_alias: Option<String>,
    /// Widget alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Remaining properties, including the `descriptor`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TbEntity for WidgetType {
    const ENTITY_TYPE: EntityType = EntityType::WidgetType;

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: Option<EntityId>) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Widget names are only unique inside one bundle.
    fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.bundle_alias == other.bundle_alias
    }
}
