// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live attribute and telemetry subscriptions over WebSocket.
//!
//! - [`build_subscription`] / [`build_unsubscribe`] - Command payloads
//! - [`parse_message`] / [`parse_frame`] - Decoding of update frames
//! - [`WsClient`] - Socket shared by many [`Subscription`]s, with reconnection
//! - [`save_attribute_changes`] - Attribute history recorded as telemetry

mod client;
mod command;
mod history;
mod parser;

pub use client::{DEFAULT_CONNECT_TIMEOUT, Subscription, WsClient, ws_url};
pub use command::{CommandWrapper, SubscriptionCommand, build_subscription, build_unsubscribe};
pub use history::{history_record, save_attribute_changes};
pub use parser::{UpdateFrame, parse_frame, parse_message, parse_subscription_id};
