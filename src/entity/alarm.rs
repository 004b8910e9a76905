// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EntityId;

/// Alarm severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSeverity {
    Critical,
    Major,
    Minor,
    Warning,
    Indeterminate,
}

/// Lifecycle state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmStatus {
    ActiveUnack,
    ActiveAck,
    ClearedUnack,
    ClearedAck,
}

impl AlarmStatus {
    /// Returns the name used by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveUnack => "ACTIVE_UNACK",
            Self::ActiveAck => "ACTIVE_ACK",
            Self::ClearedUnack => "CLEARED_UNACK",
            Self::ClearedAck => "CLEARED_ACK",
        }
    }

    /// Returns true for both active states.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::ActiveAck | Self::ActiveUnack)
    }
}

/// Status filter of alarm queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSearchStatus {
    Any,
    Active,
    Cleared,
    Ack,
    Unack,
}

impl AlarmSearchStatus {
    /// Returns the name used by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Active => "ACTIVE",
            Self::Cleared => "CLEARED",
            Self::Ack => "ACK",
            Self::Unack => "UNACK",
        }
    }
}

/// An alarm raised for an originator entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Entity the alarm was raised for.
    pub originator: EntityId,
    /// Alarm type, e.g. `High Temperature`.
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub severity: AlarmSeverity,
    pub status: AlarmStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Alarm {
    /// Creates a new unacknowledged active alarm.
    #[must_use]
    pub fn new(originator: EntityId, alarm_type: impl Into<String>, severity: AlarmSeverity) -> Self {
        Self {
            id: None,
            originator,
            alarm_type: alarm_type.into(),
            severity,
            status: AlarmStatus::ActiveUnack,
            extra: Map::new(),
        }
    }

    /// Returns true if the alarm is `ACTIVE_ACK` or `ACTIVE_UNACK`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
