// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local copy of a device's attributes and latest telemetry.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::entity::{Device, EntityId, SubscriptionType, is_attr_telemetry_key};
use crate::subscription::{AttrUpdate, Subscribable, SubscriptionId};

/// Twin contents: one key/value map per subscription type.
pub type TwinAttributes = HashMap<SubscriptionType, Map<String, Value>>;

/// Thread-safe local twin of a device.
///
/// The usual flow is: send an update to the platform, receive it back through
/// a subscription, store it with [`DeviceTwin::apply`]. Telemetry keys
/// written by attribute history are never stored.
///
/// Values compare by JSON equality or, failing that, by their text form, so
/// `"true"` and `true` are the same value. The platform may hand back
/// non-string values as strings.
///
/// # Examples
///
/// ```
/// use serde_json::{Map, json};
/// use tbkit::entity::{Device, SubscriptionType};
/// use tbkit::state::DeviceTwin;
///
/// let twin = DeviceTwin::new(Device::new("press-1", "default"));
/// twin.update(SubscriptionType::SharedScope, "enabled", json!("true"));
///
/// let mut wanted = Map::new();
/// wanted.insert("enabled".into(), json!(true));
/// wanted.insert("speed".into(), json!(3));
///
/// let diff = twin.update_diff(SubscriptionType::SharedScope, &wanted, false);
/// assert_eq!(diff.len(), 1);
/// assert_eq!(diff["speed"], 3);
/// ```
#[derive(Debug)]
pub struct DeviceTwin {
    device: Device,
    attributes: RwLock<TwinAttributes>,
}

impl DeviceTwin {
    /// Creates an empty twin of `device`.
    #[must_use]
    pub fn new(device: Device) -> Self {
        Self {
            device,
            attributes: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.device.name
    }

    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.device.id
    }

    /// Returns a snapshot of the whole twin.
    #[must_use]
    pub fn snapshot(&self) -> TwinAttributes {
        self.attributes.read().clone()
    }

    /// Replaces the whole twin.
    pub fn replace(&self, attributes: TwinAttributes) {
        *self.attributes.write() = attributes;
    }

    /// Returns a copy of one scope, `None` if the scope was never written.
    #[must_use]
    pub fn get_scope(&self, kind: SubscriptionType) -> Option<Map<String, Value>> {
        self.attributes.read().get(&kind).cloned()
    }

    /// Returns one value.
    #[must_use]
    pub fn get(&self, kind: SubscriptionType, key: &str) -> Option<Value> {
        self.attributes
            .read()
            .get(&kind)
            .and_then(|scope| scope.get(key))
            .cloned()
    }

    /// Stores one value. Returns `false` for attribute history keys, which
    /// are ignored.
    pub fn update(&self, kind: SubscriptionType, key: &str, value: Value) -> bool {
        if is_attr_telemetry_key(key) {
            tracing::debug!(kind = %kind, key = %key, "Ignoring attribute history key");
            return false;
        }

        let mut attributes = self.attributes.write();
        let scope = attributes.entry(kind).or_insert_with(|| {
            tracing::debug!(kind = %kind, "Creating twin scope");
            Map::new()
        });
        if scope.contains_key(key) {
            tracing::debug!(kind = %kind, key = %key, value = %value, "Updating twin value");
        } else {
            tracing::debug!(kind = %kind, key = %key, value = %value, "Storing new twin value");
        }
        scope.insert(key.to_string(), value);
        true
    }

    /// Stores every value of `values`.
    pub fn update_scope(&self, kind: SubscriptionType, values: &Map<String, Value>) {
        for (key, value) in values {
            self.update(kind, key, value.clone());
        }
    }

    /// Stores every scope of `update`.
    pub fn update_all(&self, update: &TwinAttributes) {
        for (kind, values) in update {
            self.update_scope(*kind, values);
        }
    }

    /// Stores a received update.
    pub fn apply(&self, kind: SubscriptionType, update: &AttrUpdate) -> bool {
        self.update(kind, &update.key, update.value.clone())
    }

    /// Keeps the twin in sync with the updates of `source`.
    pub fn track<S: Subscribable>(self: &Arc<Self>, kind: SubscriptionType, source: &S) -> SubscriptionId {
        let twin = Arc::clone(self);
        source.on_updates(move |updates| {
            for update in updates {
                twin.apply(kind, update);
            }
        })
    }

    /// Returns the part of `update` that differs from the twin.
    ///
    /// With `ignore_twin_null`, values missing or null in the twin never
    /// count as different; a scope missing from the twin yields nothing.
    /// Without it, a missing scope yields the whole update and a missing key
    /// counts as different.
    #[must_use]
    pub fn update_diff(
        &self,
        kind: SubscriptionType,
        update: &Map<String, Value>,
        ignore_twin_null: bool,
    ) -> Map<String, Value> {
        let attributes = self.attributes.read();
        let Some(twin) = attributes.get(&kind) else {
            tracing::debug!(kind = %kind, "Scope not present in twin");
            return if ignore_twin_null {
                Map::new()
            } else {
                update.clone()
            };
        };

        update
            .iter()
            .filter(|(key, value)| {
                let current = twin.get(key.as_str());
                if ignore_twin_null {
                    are_different_ignore_twin_null(current, value)
                } else {
                    current.is_none() || are_different(current, value)
                }
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Returns the part of a multi-scope update that differs from the twin.
    #[must_use]
    pub fn update_diff_all(&self, update: &TwinAttributes, ignore_twin_null: bool) -> TwinAttributes {
        update
            .iter()
            .map(|(kind, values)| (*kind, self.update_diff(*kind, values, ignore_twin_null)))
            .collect()
    }

    /// Returns true if `value` differs from the twin's value of `key`.
    #[must_use]
    pub fn is_different(
        &self,
        kind: SubscriptionType,
        key: &str,
        value: &Value,
        ignore_twin_null: bool,
    ) -> bool {
        let mut update = Map::new();
        update.insert(key.to_string(), value.clone());
        !self.update_diff(kind, &update, ignore_twin_null).is_empty()
    }
}

fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

fn is_null(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_null)
}

fn are_different(current: Option<&Value>, update: &Value) -> bool {
    match (is_null(current), update.is_null()) {
        (true, true) => false,
        (true, false) | (false, true) => true,
        (false, false) => current.is_some_and(|c| c != update && text(c) != text(update)),
    }
}

fn are_different_ignore_twin_null(current: Option<&Value>, update: &Value) -> bool {
    match current {
        None | Some(Value::Null) => false,
        Some(c) => c != update && text(c) != text(update),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SHARED: SubscriptionType = SubscriptionType::SharedScope;

    fn twin() -> DeviceTwin {
        let twin = DeviceTwin::new(Device::new("twin-device", "default"));
        twin.update(SHARED, "enabled", json!("true"));
        twin.update(SHARED, "speed", json!(3));
        twin.update(SHARED, "note", Value::Null);
        twin
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    mod storage {
        use super::*;

        #[test]
        fn update_and_get() {
            let twin = twin();
            assert_eq!(twin.get(SHARED, "speed"), Some(json!(3)));
            assert_eq!(twin.get(SubscriptionType::ClientScope, "speed"), None);
            assert_eq!(twin.name(), "twin-device");
        }

        #[test]
        fn history_keys_are_ignored() {
            let twin = twin();
            assert!(!twin.update(SHARED, "attrscope__SHARED_SCOPE__name__speed", json!(1)));
            assert_eq!(twin.get_scope(SHARED).unwrap().len(), 3);
        }

        #[test]
        fn apply_update() {
            let twin = twin();
            twin.apply(SubscriptionType::LatestTelemetry, &AttrUpdate::new("temp", 1, "21.5"));
            assert_eq!(
                twin.get(SubscriptionType::LatestTelemetry, "temp"),
                Some(json!("21.5"))
            );
        }

        #[test]
        fn track_subscribable_source() {
            struct Source(crate::subscription::CallbackRegistry);
            impl Subscribable for Source {
                fn callbacks(&self) -> &crate::subscription::CallbackRegistry {
                    &self.0
                }
            }

            let twin = Arc::new(twin());
            let source = Source(crate::subscription::CallbackRegistry::new());
            twin.track(SHARED, &source);

            source.0.dispatch_updates(&[AttrUpdate::new("speed", 5, 4)]);
            assert_eq!(twin.get(SHARED, "speed"), Some(json!(4)));
        }
    }

    mod diff {
        use super::*;

        #[test]
        fn string_representation_counts_as_equal() {
            let twin = twin();
            let diff = twin.update_diff(SHARED, &map(json!({"enabled": true, "speed": "3"})), false);
            assert!(diff.is_empty());
        }

        #[test]
        fn changed_and_new_values() {
            let twin = twin();
            let diff = twin.update_diff(
                SHARED,
                &map(json!({"enabled": false, "speed": 3, "mode": "eco"})),
                false,
            );
            assert_eq!(Value::Object(diff), json!({"enabled": false, "mode": "eco"}));
        }

        #[test]
        fn null_handling() {
            let twin = twin();
            assert!(!twin.is_different(SHARED, "note", &Value::Null, false));
            assert!(twin.is_different(SHARED, "note", &json!("x"), false));
            assert!(twin.is_different(SHARED, "speed", &Value::Null, false));
        }

        #[test]
        fn ignore_twin_null() {
            let twin = twin();
            let update = map(json!({"note": "x", "mode": "eco", "speed": 4}));
            let diff = twin.update_diff(SHARED, &update, true);
            assert_eq!(Value::Object(diff), json!({"speed": 4}));
        }

        #[test]
        fn missing_scope() {
            let twin = twin();
            let update = map(json!({"a": 1}));
            let kind = SubscriptionType::ServerScope;

            assert_eq!(twin.update_diff(kind, &update, false), update);
            assert!(twin.update_diff(kind, &update, true).is_empty());
        }

        #[test]
        fn multi_scope_diff() {
            let twin = twin();
            let mut update = TwinAttributes::new();
            update.insert(SHARED, map(json!({"speed": 3})));
            update.insert(SubscriptionType::ClientScope, map(json!({"fw": "1.2"})));

            let diff = twin.update_diff_all(&update, false);
            assert!(diff[&SHARED].is_empty());
            assert_eq!(diff[&SubscriptionType::ClientScope]["fw"], "1.2");
        }
    }
}
