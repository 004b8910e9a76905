// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform entity models.
//!
//! Every model types the fields this crate reasons about (ids, names,
//! references between entities) and keeps all remaining properties in a
//! flattened `extra` map, so an entity read from a backup file or from the
//! platform is written back without losing configuration.
//!
//! # Examples
//!
//! ```
//! use tbkit::entity::{Device, TbEntity};
//!
//! let device: Device = serde_json::from_value(serde_json::json!({
//!     "name": "press-1",
//!     "type": "press",
//!     "additionalInfo": {"gateway": false}
//! }))
//! .unwrap();
//!
//! assert_eq!(device.name(), "press-1");
//! assert!(device.extra.contains_key("additionalInfo"));
//! ```

mod alarm;
mod asset;
mod attribute;
mod dashboard;
mod device;
mod id;
mod page;
mod relation;
mod rule_chain;
mod tenant;
mod widget;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use alarm::{Alarm, AlarmSearchStatus, AlarmSeverity, AlarmStatus};
pub use asset::Asset;
pub use attribute::{
    AttributeKv, DeviceAttribute, Scope, SubscriptionType, is_attr_telemetry_key, telemetry_attribute,
};
pub use dashboard::Dashboard;
pub use device::{Device, DeviceCredentials, DeviceProfile};
pub use id::{EntityId, EntityType};
pub use page::{PageData, PageLink, SortOrder, TimePageLink};
pub use relation::{EntityRelation, RelationDirection, RelationTypeGroup};
pub use rule_chain::{RuleChain, RuleChainData, RuleChainMetaData};
pub use tenant::{Authority, Customer, Tenant, TenantProfile, User};
pub use widget::{WidgetType, WidgetsBundle};

/// Common behaviour of entities stored through the generic entity endpoints.
pub trait TbEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Kind of this entity.
    const ENTITY_TYPE: EntityType;

    /// Returns the id, if the entity has been stored already.
    fn id(&self) -> Option<EntityId>;

    /// Replaces the id. `None` makes the platform create a new entity on save.
    fn set_id(&mut self, id: Option<EntityId>);

    /// Returns the human-facing identity: name, title or email.
    fn name(&self) -> &str;

    /// Returns the UUID part of the id.
    fn uuid(&self) -> Option<Uuid> {
        self.id().map(|id| id.id)
    }

    /// Returns true if both entities describe the same logical object.
    ///
    /// Used to detect duplicates. Entities match on [`TbEntity::name`] by
    /// default.
    fn same_identity(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

macro_rules! impl_tb_entity {
    ($ty:ty, $kind:ident, $name:ident) => {
        impl $crate::entity::TbEntity for $ty {
            const ENTITY_TYPE: $crate::entity::EntityType = $crate::entity::EntityType::$kind;

            fn id(&self) -> Option<$crate::entity::EntityId> {
                self.id
            }

            fn set_id(&mut self, id: Option<$crate::entity::EntityId>) {
                self.id = id;
            }

            fn name(&self) -> &str {
                &self.$name
            }
        }
    };
}

pub(crate) use impl_tb_entity;
