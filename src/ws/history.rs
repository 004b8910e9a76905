// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute history: every attribute change is mirrored as telemetry.
//!
//! Attributes only keep their latest value. Recording each change under a
//! telemetry key of the form `attrscope__{SCOPE}__name__{key}` keeps the
//! full history in the time-series store.

use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::client::{Subscription, WsClient};
use crate::entity::{Scope, telemetry_attribute};
use crate::error::Result;
use crate::rest::RestClient;
use crate::subscription::AttrUpdate;

/// Builds the telemetry payload recording one attribute change.
#[must_use]
pub fn history_record(scope: Scope, update: &AttrUpdate) -> Value {
    let mut values = Map::new();
    values.insert(telemetry_attribute(scope, &update.key), update.value.clone());
    json!({ "ts": update.timestamp, "values": values })
}

/// Mirrors every attribute change of a device into telemetry.
///
/// Subscribes to all three attribute scopes on `ws`; each update is written
/// back through `rest`. Cancel the returned subscriptions to stop.
///
/// # Errors
///
/// Returns an error if a subscription cannot be sent.
pub fn save_attribute_changes(
    rest: &RestClient,
    ws: &WsClient,
    device_id: Uuid,
) -> Result<Vec<(Scope, Subscription)>> {
    Scope::ALL
        .iter()
        .map(|&scope| {
            let rest = rest.clone();
            let subscription = ws.subscribe_with::<&str, _>(device_id, scope.into(), &[], move |updates| {
                let records: Vec<Value> = updates
                    .iter()
                    .map(|update| history_record(scope, update))
                    .collect();
                if records.is_empty() {
                    return;
                }

                let rest = rest.clone();
                tokio::spawn(async move {
                    for record in records {
                        if let Err(e) = rest.send_telemetry(device_id, &record).await {
                            tracing::warn!(
                                device_id = %device_id,
                                scope = %scope,
                                error = %e,
                                "Failed to record attribute change"
                            );
                        }
                    }
                });
            })?;
            Ok((scope, subscription))
        })
        .collect()
}
