// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local device state.
//!
//! A [`DeviceTwin`] mirrors the attributes and latest telemetry of a device,
//! keyed by [`SubscriptionType`](crate::entity::SubscriptionType). It tells
//! which values of a desired configuration still differ from what the
//! platform reported, so only those need to be sent.

mod device_twin;

pub use device_twin::{DeviceTwin, TwinAttributes};
