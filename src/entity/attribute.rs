// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute scope.
///
/// - client attributes are reported by the device,
/// - server attributes are private to the platform,
/// - shared attributes are pushed from the platform to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    ClientScope,
    ServerScope,
    SharedScope,
}

impl Scope {
    /// All scopes.
    pub const ALL: [Scope; 3] = [Self::ClientScope, Self::ServerScope, Self::SharedScope];

    /// Returns the name used by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientScope => "CLIENT_SCOPE",
            Self::ServerScope => "SERVER_SCOPE",
            Self::SharedScope => "SHARED_SCOPE",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of data a WebSocket subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionType {
    ClientScope,
    ServerScope,
    SharedScope,
    LatestTelemetry,
}

impl SubscriptionType {
    /// Returns the name used by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientScope => "CLIENT_SCOPE",
            Self::ServerScope => "SERVER_SCOPE",
            Self::SharedScope => "SHARED_SCOPE",
            Self::LatestTelemetry => "LATEST_TELEMETRY",
        }
    }

    /// Returns the attribute scope, or `None` for telemetry.
    #[must_use]
    pub fn scope(self) -> Option<Scope> {
        match self {
            Self::ClientScope => Some(Scope::ClientScope),
            Self::ServerScope => Some(Scope::ServerScope),
            Self::SharedScope => Some(Scope::SharedScope),
            Self::LatestTelemetry => None,
        }
    }
}

impl From<Scope> for SubscriptionType {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::ClientScope => Self::ClientScope,
            Scope::ServerScope => Self::ServerScope,
            Scope::SharedScope => Self::SharedScope,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value as returned by the attribute query endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKv {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_ts: Option<i64>,
}

/// A well-known attribute: name plus scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAttribute {
    pub name: &'static str,
    pub scope: Scope,
}

impl DeviceAttribute {
    /// Server-side activity flag maintained by the platform.
    pub const ACTIVE: Self = Self {
        name: "active",
        scope: Scope::ServerScope,
    };

    /// Inactivity timeout (ms) after which a device turns inactive.
    pub const INACTIVITY_TIMEOUT: Self = Self {
        name: "inactivityTimeout",
        scope: Scope::ServerScope,
    };
}

impl fmt::Display for DeviceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const ATTR_TELEMETRY_PREFIX: &str = "attrscope__";

/// Returns the telemetry key recording attribute `name` of `scope`, of the
/// form `attrscope__{SCOPE}__name__{name}`.
#[must_use]
pub fn telemetry_attribute(scope: Scope, name: &str) -> String {
    format!("{ATTR_TELEMETRY_PREFIX}{scope}__name__{name}")
}

/// Returns true if `key` is a telemetry key written by attribute history.
#[must_use]
pub fn is_attr_telemetry_key(key: &str) -> bool {
    key.starts_with(ATTR_TELEMETRY_PREFIX)
}
