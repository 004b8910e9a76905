// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, impl_tb_entity};

/// A tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Tenant title.
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(Tenant, Tenant, title);

/// A tenant profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(TenantProfile, TenantProfile, name);

/// A customer. Customers are identified by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(Customer, Customer, title);

/// Role of a user account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Authority {
    /// System administrator.
    SysAdmin,
    /// Tenant administrator.
    #[default]
    TenantAdmin,
    /// Customer user.
    CustomerUser,
}

/// A user account. Users are identified by email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Login email.
    pub email: String,
    #[serde(default)]
    pub authority: Authority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Creates a tenant administrator whose first and last name are the
    /// local part and the domain of the email.
    #[must_use]
    pub fn tenant_admin(email: impl Into<String>, tenant_id: EntityId) -> Self {
        let email = email.into();
        let (first, last) = email.split_once('@').unwrap_or((email.as_str(), ""));
        Self {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            authority: Authority::TenantAdmin,
            tenant_id: Some(tenant_id),
            email,
            ..Self::default()
        }
    }
}

impl_tb_entity!(User, User, email);

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn tenant_admin_names_from_email() {
        let tenant = EntityId::new(EntityType::Tenant, Uuid::nil());
        let user = User::tenant_admin("operator@plant.example", tenant);

        assert_eq!(user.first_name.as_deref(), Some("operator"));
        assert_eq!(user.last_name.as_deref(), Some("plant.example"));

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["authority"], "TENANT_ADMIN");
        assert_eq!(json["tenantId"]["entityType"], "TENANT");
    }
}
