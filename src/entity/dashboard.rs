// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, impl_tb_entity};

/// A dashboard. Listing endpoints return it without `configuration`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Id, absent for dashboards not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Dashboard title, its name on the platform.
    pub title: String,
    /// Remaining properties, including the layout `configuration`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(Dashboard, Dashboard, title);
