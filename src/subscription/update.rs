// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde_json::Value;

/// One changed value delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrUpdate {
    /// Attribute or telemetry key.
    pub key: String,
    /// Time of the change, ms since epoch.
    pub timestamp: i64,
    /// New value, exactly as the platform sent it.
    pub value: Value,
}

impl AttrUpdate {
    /// Creates a new update.
    #[must_use]
    pub fn new(key: impl Into<String>, timestamp: i64, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            timestamp,
            value: value.into(),
        }
    }

    /// Returns the value as text; strings are returned without quotes.
    #[must_use]
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AttrUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}={}", self.key, self.timestamp, self.value_text())
    }
}
