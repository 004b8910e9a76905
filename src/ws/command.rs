// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription command payloads.
//!
//! The telemetry plugin expects a wrapper with three command lists:
//!
//! ```json
//! {
//!   "attrSubCmds": [
//!     {"entityType": "DEVICE", "entityId": "...", "scope": "SHARED_SCOPE", "cmdId": 7, "keys": "a,b"}
//!   ],
//!   "tsSubCmds": [],
//!   "historyCmds": []
//! }
//! ```

use std::sync::atomic::{AtomicI32, Ordering};

use serde::Serialize;
use uuid::Uuid;

use crate::entity::{EntityType, SubscriptionType};
use crate::error::Result;

/// Source of command ids, unique for the lifetime of the process.
static CMD_ID_COUNTER: AtomicI32 = AtomicI32::new(1);

fn next_cmd_id() -> i32 {
    CMD_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A single attribute or telemetry subscription command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCommand {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub scope: SubscriptionType,
    pub cmd_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unsubscribe: bool,
}

impl SubscriptionCommand {
    /// Creates a device subscription command with a fresh `cmdId`.
    ///
    /// An empty key list subscribes to every key.
    #[must_use]
    pub fn new<S: AsRef<str>>(device_id: Uuid, kind: SubscriptionType, keys: &[S]) -> Self {
        let keys = (!keys.is_empty()).then(|| {
            keys.iter()
                .map(|k| k.as_ref().trim())
                .collect::<Vec<_>>()
                .join(",")
        });

        Self {
            entity_type: EntityType::Device,
            entity_id: device_id,
            scope: kind,
            cmd_id: next_cmd_id(),
            keys,
            unsubscribe: false,
        }
    }

    /// Returns the command that cancels this subscription.
    #[must_use]
    pub fn to_unsubscribe(&self) -> Self {
        Self {
            unsubscribe: true,
            ..self.clone()
        }
    }

    /// Wraps the command into the plugin envelope.
    #[must_use]
    pub fn wrap(&self) -> CommandWrapper<'_> {
        let (attr, ts) = if self.scope == SubscriptionType::LatestTelemetry {
            (Vec::new(), vec![self])
        } else {
            (vec![self], Vec::new())
        };

        CommandWrapper {
            attr_sub_cmds: attr,
            ts_sub_cmds: ts,
            history_cmds: Vec::new(),
        }
    }

    /// Serializes the wrapped command.
    ///
    /// # Errors
    ///
    /// Returns a parse error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.wrap())?)
    }
}

/// Envelope sent over the socket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandWrapper<'a> {
    pub attr_sub_cmds: Vec<&'a SubscriptionCommand>,
    pub ts_sub_cmds: Vec<&'a SubscriptionCommand>,
    pub history_cmds: Vec<&'a SubscriptionCommand>,
}

/// Builds a subscription payload and returns it with its `cmdId`.
///
/// # Errors
///
/// Returns a parse error if serialization fails.
pub fn build_subscription<S: AsRef<str>>(
    device_id: Uuid,
    kind: SubscriptionType,
    keys: &[S],
) -> Result<(i32, String)> {
    let command = SubscriptionCommand::new(device_id, kind, keys);
    Ok((command.cmd_id, command.to_json()?))
}

/// Builds the payload cancelling subscription `cmd_id` of `device_id`.
///
/// # Errors
///
/// Returns a parse error if serialization fails.
pub fn build_unsubscribe(device_id: Uuid, cmd_id: i32, kind: SubscriptionType) -> Result<String> {
    let command = SubscriptionCommand {
        entity_type: EntityType::Device,
        entity_id: device_id,
        scope: kind,
        cmd_id,
        keys: None,
        unsubscribe: true,
    };
    command.to_json()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn attribute_subscription_goes_into_attr_cmds() {
        let device = Uuid::new_v4();
        let (id, text) =
            build_subscription(device, SubscriptionType::SharedScope, &["some", "key", "sequence"])
                .unwrap();

        let actual: Value = serde_json::from_str(&text).unwrap();
        let expected = json!({
            "attrSubCmds": [{
                "cmdId": id,
                "entityType": "DEVICE",
                "keys": "some,key,sequence",
                "scope": "SHARED_SCOPE",
                "entityId": device.to_string(),
            }],
            "tsSubCmds": [],
            "historyCmds": [],
        });
        assert_eq!(actual, expected);
    }

    #[test]
    fn telemetry_subscription_goes_into_ts_cmds() {
        let (_, text) =
            build_subscription::<&str>(Uuid::nil(), SubscriptionType::LatestTelemetry, &[]).unwrap();
        let actual: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(actual["attrSubCmds"], json!([]));
        assert_eq!(actual["tsSubCmds"][0]["scope"], "LATEST_TELEMETRY");
        assert!(actual["tsSubCmds"][0].get("keys").is_none());
        assert!(actual["tsSubCmds"][0].get("unsubscribe").is_none());
    }

    #[test]
    fn keys_are_joined_without_whitespace() {
        let command = SubscriptionCommand::new(Uuid::nil(), SubscriptionType::ClientScope, &[" a", "b "]);
        assert_eq!(command.keys.as_deref(), Some("a,b"));
    }

    #[test]
    fn command_ids_are_unique() {
        let a = SubscriptionCommand::new::<&str>(Uuid::nil(), SubscriptionType::ClientScope, &[]);
        let b = SubscriptionCommand::new::<&str>(Uuid::nil(), SubscriptionType::ClientScope, &[]);
        assert_ne!(a.cmd_id, b.cmd_id);
    }

    #[test]
    fn unsubscribe_flags_the_command() {
        let text = build_unsubscribe(Uuid::nil(), 42, SubscriptionType::ServerScope).unwrap();
        let actual: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(actual["attrSubCmds"][0]["cmdId"], 42);
        assert_eq!(actual["attrSubCmds"][0]["unsubscribe"], true);
    }
}
