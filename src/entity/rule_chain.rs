// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityId, impl_tb_entity};

/// A rule chain header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChain {
    /// Id, absent for chains not stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Rule chain name.
    pub name: String,
    /// Whether this is the tenant's root chain.
    #[serde(default)]
    pub root: bool,
    /// Remaining properties.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_tb_entity!(RuleChain, RuleChain, name);

/// Nodes and connections of one rule chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChainMetaData {
    /// Chain the metadata belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_chain_id: Option<EntityId>,
    /// Remaining properties (nodes, connections, first node index).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Export/import bundle of rule chains and their metadata.
///
/// This is also the layout of rule chain backup files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChainData {
    /// Rule chain headers.
    #[serde(default)]
    pub rule_chains: Vec<RuleChain>,
    /// Metadata, one entry per chain.
    #[serde(default)]
    pub metadata: Vec<RuleChainMetaData>,
}

impl RuleChainData {
    /// Appends all chains and metadata of `other`.
    pub fn merge(&mut self, other: RuleChainData) {
        self.rule_chains.extend(other.rule_chains);
        self.metadata.extend(other.metadata);
    }

    /// Returns true if the bundle holds no chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rule_chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_file_layout() {
        let data: RuleChainData = serde_json::from_value(serde_json::json!({
            "ruleChains": [{"name": "Root Rule Chain", "root": true, "type": "CORE"}],
            "metadata": [{"firstNodeIndex": 0, "nodes": [], "connections": []}]
        }))
        .unwrap();

        assert_eq!(data.rule_chains.len(), 1);
        assert!(data.rule_chains[0].root);
        assert_eq!(data.metadata[0].extra["firstNodeIndex"], 0);
    }

    #[test]
    fn merge_keeps_order() {
        let mut first = RuleChainData {
            rule_chains: vec![RuleChain {
                name: "a".into(),
                ..RuleChain::default()
            }],
            metadata: vec![RuleChainMetaData::default()],
        };
        let second = RuleChainData {
            rule_chains: vec![RuleChain {
                name: "b".into(),
                ..RuleChain::default()
            }],
            metadata: vec![RuleChainMetaData::default()],
        };

        first.merge(second);
        let names: Vec<_> = first.rule_chains.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(first.metadata.len(), 2);
    }
}
