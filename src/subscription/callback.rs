// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for live updates.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Registry storing listeners and dispatching updates

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::AttrUpdate;

/// Unique identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type UpdatesCallback = Arc<dyn Fn(&[AttrUpdate]) + Send + Sync>;
type KeyCallback = Arc<dyn Fn(&AttrUpdate) + Send + Sync>;
type AttributesCallback = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// Registry of update listeners.
///
/// - batch listeners receive every ordered batch of updates,
/// - key listeners receive the single updates of one key,
/// - attribute listeners receive raw attribute maps pushed over MQTT,
/// - error listeners receive platform error codes.
///
/// Listeners are called synchronously on the task that dispatches. The lock
/// is released before they run, so a listener may (un)subscribe.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    batch_callbacks: RwLock<HashMap<SubscriptionId, UpdatesCallback>>,
    key_callbacks: RwLock<HashMap<SubscriptionId, (String, KeyCallback)>>,
    attributes_callbacks: RwLock<HashMap<SubscriptionId, AttributesCallback>>,
    error_callbacks: RwLock<HashMap<SubscriptionId, ErrorCallback>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            batch_callbacks: RwLock::new(HashMap::new()),
            key_callbacks: RwLock::new(HashMap::new()),
            attributes_callbacks: RwLock::new(HashMap::new()),
            error_callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration methods
    // =========================================================================

    /// Registers a listener for whole update batches, sorted by timestamp.
    pub fn on_updates<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[AttrUpdate]) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.batch_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a listener for the updates of one key.
    pub fn on_key<F>(&self, key: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&AttrUpdate) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.key_callbacks
            .write()
            .insert(id, (key.into(), Arc::new(callback)));
        id
    }

    /// Registers a listener for raw attribute maps.
    pub fn on_attributes<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.attributes_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a listener for error frames (code, message).
    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i32, &str) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.error_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Unregisters a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.batch_callbacks.write().remove(&id).is_some()
            || self.key_callbacks.write().remove(&id).is_some()
            || self.attributes_callbacks.write().remove(&id).is_some()
            || self.error_callbacks.write().remove(&id).is_some()
    }

    /// Clears all listeners.
    pub fn clear(&self) {
        self.batch_callbacks.write().clear();
        self.key_callbacks.write().clear();
        self.attributes_callbacks.write().clear();
        self.error_callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch methods
    // =========================================================================

    /// Dispatches a batch: batch listeners get the whole slice, key
    /// listeners each matching update in order. Empty batches are dropped.
    pub fn dispatch_updates(&self, updates: &[AttrUpdate]) {
        if updates.is_empty() {
            return;
        }

        let batch: Vec<UpdatesCallback> = self.batch_callbacks.read().values().cloned().collect();
        for callback in batch {
            callback(updates);
        }

        let keyed: Vec<(String, KeyCallback)> =
            self.key_callbacks.read().values().cloned().collect();
        if keyed.is_empty() {
            return;
        }
        for update in updates {
            for (key, callback) in &keyed {
                if *key == update.key {
                    callback(update);
                }
            }
        }
    }

    /// Dispatches a raw attribute map.
    pub fn dispatch_attributes(&self, attributes: &Map<String, Value>) {
        let callbacks: Vec<AttributesCallback> =
            self.attributes_callbacks.read().values().cloned().collect();
        for callback in callbacks {
            callback(attributes);
        }
    }

    /// Dispatches an error code and message.
    pub fn dispatch_error(&self, code: i32, message: &str) {
        let callbacks: Vec<ErrorCallback> = self.error_callbacks.read().values().cloned().collect();
        for callback in callbacks {
            callback(code, message);
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns the total number of registered listeners.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.batch_callbacks.read().len()
            + self.key_callbacks.read().len()
            + self.attributes_callbacks.read().len()
            + self.error_callbacks.read().len()
    }

    /// Returns `true` if there are no registered listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
