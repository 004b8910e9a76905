// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-side MQTT API.
//!
//! A [`DeviceMqttClient`] logs in with a device access token and uses the
//! `v1/devices/me/...` topics:
//!
//! - telemetry upload on `v1/devices/me/telemetry`
//! - client attribute upload and shared attribute pushes on `v1/devices/me/attributes`
//! - attribute requests on `v1/devices/me/attributes/request/{id}`, answered on
//!   `v1/devices/me/attributes/response/{id}`

mod client;
mod payload;

pub use client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_REQUEST_TIMEOUT, DeviceMqttClient,
    DeviceMqttClientBuilder,
};
pub use payload::{
    AttributeRequest, AttributeResponse, DeviceToken, TOPIC_ATTRIBUTES, TOPIC_ATTRIBUTES_REQUEST,
    TOPIC_ATTRIBUTES_RESPONSE, TOPIC_ATTRIBUTES_RESPONSE_ALL, TOPIC_TELEMETRY,
    attributes_request_topic, response_request_id,
};
