// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for sources of live updates.

use serde_json::{Map, Value};

use crate::subscription::{AttrUpdate, CallbackRegistry, SubscriptionId};

/// Trait for types that deliver live updates to listeners.
///
/// Implemented by WebSocket subscriptions and by the device MQTT client.
/// Implementors only expose their [`CallbackRegistry`]; registration is
/// provided here.
///
/// # Examples
///
/// ```no_run
/// use tbkit::subscription::Subscribable;
/// use tbkit::ws::WsClient;
/// use tbkit::entity::SubscriptionType;
///
/// # async fn example(ws: WsClient, device: uuid::Uuid) -> tbkit::Result<()> {
/// let subscription = ws
///     .subscribe(device, SubscriptionType::SharedScope, &["targetTemp"])?;
///
/// let id = subscription.on_key("targetTemp", |update| {
///     println!("target temperature is now {}", update.value_text());
/// });
///
/// subscription.unsubscribe_listener(id);
/// # Ok(())
/// # }
/// ```
pub trait Subscribable {
    /// Returns the registry updates are dispatched through.
    fn callbacks(&self) -> &CallbackRegistry;

    /// Subscribes to ordered update batches.
    fn on_updates<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[AttrUpdate]) + Send + Sync + 'static,
    {
        self.callbacks().on_updates(callback)
    }

    /// Subscribes to the updates of one key.
    fn on_key<F>(&self, key: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&AttrUpdate) + Send + Sync + 'static,
    {
        self.callbacks().on_key(key, callback)
    }

    /// Subscribes to raw attribute maps.
    fn on_attributes<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        self.callbacks().on_attributes(callback)
    }

    /// Subscribes to error frames.
    fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i32, &str) + Send + Sync + 'static,
    {
        self.callbacks().on_error(callback)
    }

    /// Removes a listener. Returns `true` if it was registered.
    fn unsubscribe_listener(&self, id: SubscriptionId) -> bool {
        self.callbacks().unsubscribe(id)
    }
}
