// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EntityId;

/// Group a relation belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationTypeGroup {
    /// Relations created by users.
    #[default]
    Common,
    /// Alarm propagation relations.
    Alarm,
    /// Dashboard assignments.
    Dashboard,
    /// Rule chain relations.
    RuleChain,
    /// Rule node relations.
    RuleNode,
    /// Edge relations.
    Edge,
}

impl RelationTypeGroup {
    /// Returns the name used by the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "COMMON",
            Self::Alarm => "ALARM",
            Self::Dashboard => "DASHBOARD",
            Self::RuleChain => "RULE_CHAIN",
            Self::RuleNode => "RULE_NODE",
            Self::Edge => "EDGE",
        }
    }
}

/// Directed, typed relation between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRelation {
    /// Source entity.
    pub from: EntityId,
    /// Target entity.
    pub to: EntityId,
    /// Relation type, e.g. `Contains`.
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Relation group.
    #[serde(default)]
    pub type_group: RelationTypeGroup,
    /// Remaining properties (`additionalInfo`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRelation {
    /// Creates a `COMMON` relation.
    #[must_use]
    pub fn new(from: EntityId, to: EntityId, relation_type: impl Into<String>) -> Self {
        Self {
            from,
            to,
            relation_type: relation_type.into(),
            type_group: RelationTypeGroup::Common,
            extra: Map::new(),
        }
    }
}

/// Direction used when looking up relations of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationDirection {
    /// Relations starting at the entity.
    From,
    /// Relations ending at the entity.
    To,
    /// Both of the above.
    Both,
}

impl RelationDirection {
    /// Returns true for `From` and `Both`.
    #[must_use]
    pub fn is_from(self) -> bool {
        self != Self::To
    }

    /// Returns true for `To` and `Both`.
    #[must_use]
    pub fn is_to(self) -> bool {
        self != Self::From
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn direction_flags() {
        assert!(RelationDirection::From.is_from());
        assert!(!RelationDirection::From.is_to());
        assert!(RelationDirection::To.is_to());
        assert!(!RelationDirection::To.is_from());
        assert!(RelationDirection::Both.is_from() && RelationDirection::Both.is_to());
    }

    #[test]
    fn relation_wire_format() {
        let relation = EntityRelation::new(
            EntityId::new(EntityType::Asset, Uuid::nil()),
            EntityId::device(Uuid::nil()),
            "Contains",
        );
        let json = serde_json::to_value(&relation).unwrap();
        assert_eq!(json["type"], "Contains");
        assert_eq!(json["typeGroup"], "COMMON");
        assert_eq!(json["from"]["entityType"], "ASSET");
    }
}
