// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener registry for live attribute and telemetry updates.
//!
//! - [`AttrUpdate`] - One changed key with its timestamp and value
//! - [`SubscriptionId`] - Identifier returned on registration, used to unsubscribe
//! - [`CallbackRegistry`] - Registry that stores listeners and dispatches updates
//! - [`Subscribable`] - Trait for update sources (WebSocket subscriptions, MQTT client)

mod callback;
mod subscribable;
mod update;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
pub use update::AttrUpdate;
