// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of update frames pushed by the telemetry plugin.
//!
//! A frame looks like:
//!
//! ```json
//! {
//!   "subscriptionId": 7,
//!   "errorCode": 0,
//!   "errorMsg": null,
//!   "data": {
//!     "pressure_value": [[1617975311084, "-0.017511"], [1617975309584, "-0.018762"]],
//!     "processingEnabled": [[1617975371768, "false"]]
//!   },
//!   "latestValues": {"processingEnabled": 1617975371768, "pressure_value": 1617975309584}
//! }
//! ```

use serde_json::Value;

use crate::error::{ParseError, Result};
use crate::subscription::AttrUpdate;

/// A decoded update frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateFrame {
    /// `cmdId` of the subscription this frame belongs to.
    pub subscription_id: Option<i32>,
    /// Non-zero when the platform rejected the subscription.
    pub error_code: i32,
    pub error_msg: Option<String>,
    /// Updates sorted by timestamp.
    pub updates: Vec<AttrUpdate>,
}

impl UpdateFrame {
    /// Returns true if the frame reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }
}

/// Parses the updates of a frame.
///
/// Empty text and frames without `data` yield an empty list. Malformed
/// entries are skipped. The result is sorted by timestamp; updates with equal
/// timestamps keep the key order of the frame.
///
/// # Errors
///
/// Returns [`ParseError::Json`] if the text is not valid JSON.
pub fn parse_message(text: &str) -> Result<Vec<AttrUpdate>> {
    let Some(root) = parse_root(text)? else {
        tracing::warn!("Received empty WebSocket message");
        return Ok(Vec::new());
    };
    Ok(collect_updates(&root, text))
}

/// Parses the `subscriptionId` of a frame, given as number or numeric text.
///
/// # Errors
///
/// Returns a [`ParseError`] if the text is not JSON or the id is missing or
/// not an `i32`.
pub fn parse_subscription_id(text: &str) -> Result<i32> {
    let root = parse_root(text)?
        .ok_or_else(|| ParseError::MissingField("subscriptionId".to_string()))?;
    subscription_id(&root)
}

/// Parses a whole frame.
///
/// # Errors
///
/// Returns [`ParseError::Json`] if the text is not valid JSON, or a
/// [`ParseError::InvalidValue`] for a malformed `subscriptionId`.
pub fn parse_frame(text: &str) -> Result<UpdateFrame> {
    let Some(root) = parse_root(text)? else {
        tracing::warn!("Received empty WebSocket message");
        return Ok(UpdateFrame::default());
    };

    let subscription_id = match root.get("subscriptionId") {
        None | Some(Value::Null) => None,
        Some(_) => Some(subscription_id(&root)?),
    };
    let error_code = root
        .get("errorCode")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or_default();
    let error_msg = root
        .get("errorMsg")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(UpdateFrame {
        subscription_id,
        error_code,
        error_msg,
        updates: collect_updates(&root, text),
    })
}

fn parse_root(text: &str) -> Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    tracing::trace!(message = %text, "Parsing WebSocket message");
    Ok(Some(serde_json::from_str(text).map_err(ParseError::Json)?))
}

fn subscription_id(root: &Value) -> Result<i32> {
    let invalid = |message: String| ParseError::InvalidValue {
        field: "subscriptionId".to_string(),
        message,
    };

    match root.get("subscriptionId") {
        None | Some(Value::Null) => Err(ParseError::MissingField("subscriptionId".to_string()).into()),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| invalid(format!("{n} is not a 32 bit integer")).into()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i32>()
            .map_err(|e| invalid(format!("'{s}': {e}")).into()),
        Some(other) => Err(invalid(format!("unexpected value {other}")).into()),
    }
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn collect_updates(root: &Value, text: &str) -> Vec<AttrUpdate> {
    let Some(data) = root.get("data").and_then(Value::as_object) else {
        tracing::warn!(message = %text, "Received message without \"data\" item");
        return Vec::new();
    };

    let mut updates = Vec::new();
    for (key, entries) in data {
        let Some(entries) = entries.as_array() else {
            tracing::warn!(key = %key, message = %text, "Update entries are not an array");
            continue;
        };

        for entry in entries {
            let parsed = entry
                .as_array()
                .filter(|pair| pair.len() >= 2)
                .and_then(|pair| Some((parse_timestamp(&pair[0])?, pair[1].clone())));

            match parsed {
                Some((timestamp, value)) => {
                    updates.push(AttrUpdate {
                        key: key.clone(),
                        timestamp,
                        value,
                    });
                }
                None => {
                    tracing::warn!(key = %key, entry = %entry, "Skipping malformed update entry");
                }
            }
        }
    }

    // stable: equal timestamps keep frame order
    updates.sort_by_key(|update| update.timestamp);
    updates
}
