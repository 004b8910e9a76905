// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tbkit` - client toolkit for the `ThingsBoard` IoT platform.
//!
//! This library provides async APIs for applications and devices that talk
//! to a `ThingsBoard` instance over REST, device MQTT and the telemetry
//! WebSocket.
//!
//! # Supported Features
//!
//! - **REST**: login, entities, telemetry, attributes, alarms, relations
//! - **Device MQTT**: telemetry and attribute publishing, attribute requests
//!   and shared attribute updates
//! - **WebSocket subscriptions**: latest telemetry, attribute scopes and
//!   attribute history with per-subscription callbacks
//! - **Backup and restore**: find, upload and remove platform configuration
//!   stored as JSON files
//! - **Device twin**, periodic **device discovery** and first-run **user
//!   setup**
//!
//! # Cargo Features
//!
//! - `http` (default): REST client and everything built on it
//! - `mqtt` (default): device MQTT client
//! - `ws` (default): WebSocket subscriptions, implies `http`
//!
//! # Quick Start
//!
//! ## REST
//!
//! ```no_run
//! use serde_json::json;
//! use tbkit::{RestClient, TbConfig};
//!
//! #[tokio::main]
//! async fn main() -> tbkit::Result<()> {
//!     let config = TbConfig::new("tb.local")
//!         .with_port(8080)
//!         .with_credentials("tenant@thingsboard.org", "tenant");
//!     let rest = RestClient::connect(&config).await?;
//!
//!     let device = rest.get_or_create_device("press-1", "default").await?;
//!     if let Some(id) = device.id {
//!         rest.send_telemetry(id.id, &json!({"temperature": 21.5})).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Device MQTT
//!
//! ```no_run
//! use serde_json::json;
//! use tbkit::mqtt::DeviceMqttClient;
//!
//! #[tokio::main]
//! async fn main() -> tbkit::Result<()> {
//!     let client = DeviceMqttClient::connect("mqtt://tb.local:1883", "A1_TEST_TOKEN").await?;
//!
//!     client.send_telemetry(&json!({"temperature": 21.5})).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## WebSocket Subscriptions
//!
//! ```no_run
//! use tbkit::entity::SubscriptionType;
//! use tbkit::ws::WsClient;
//! use tbkit::{RestClient, TbConfig};
//!
//! #[tokio::main]
//! async fn main() -> tbkit::Result<()> {
//!     let rest = RestClient::connect(&TbConfig::from_env()?).await?;
//!     let ws = WsClient::connect(&rest).await?;
//!
//!     let device = uuid::Uuid::nil();
//!     let _subscription = ws.subscribe_with(
//!         device,
//!         SubscriptionType::LatestTelemetry,
//!         &["temperature"],
//!         |updates| {
//!             for update in updates {
//!                 println!("{} = {}", update.key, update.value);
//!             }
//!         },
//!     )?;
//!     Ok(())
//! }
//! ```

pub mod config;
#[cfg(feature = "http")]
pub mod discovery;
pub mod entity;
pub mod error;
#[cfg(feature = "mqtt")]
pub mod mqtt;
#[cfg(feature = "http")]
pub mod persistence;
#[cfg(feature = "http")]
pub mod rest;
pub mod state;
pub mod stats;
pub mod subscription;
#[cfg(feature = "http")]
pub mod users;
#[cfg(feature = "ws")]
pub mod ws;

pub use config::{ReconnectionPolicy, TbConfig};
#[cfg(feature = "http")]
pub use discovery::DeviceDiscovery;
pub use entity::{Device, EntityId, EntityType, Scope, SubscriptionType};
pub use error::{ConfigError, EntityError, Error, ParseError, ProtocolError, Result};
#[cfg(feature = "mqtt")]
pub use mqtt::DeviceMqttClient;
#[cfg(feature = "http")]
pub use rest::RestClient;
pub use state::DeviceTwin;
pub use stats::MovingAverage;
pub use subscription::{AttrUpdate, CallbackRegistry, Subscribable, SubscriptionId};
#[cfg(feature = "http")]
pub use users::UserConfigurator;
#[cfg(feature = "ws")]
pub use ws::{Subscription, WsClient};
