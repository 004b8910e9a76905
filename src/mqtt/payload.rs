// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topics and payloads of the device MQTT API.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::mask_password;

/// Topic for telemetry uploads.
pub const TOPIC_TELEMETRY: &str = "v1/devices/me/telemetry";
/// Topic for client attribute uploads and shared attribute pushes.
pub const TOPIC_ATTRIBUTES: &str = "v1/devices/me/attributes";
/// Prefix of attribute request topics; the request id is appended.
pub const TOPIC_ATTRIBUTES_REQUEST: &str = "v1/devices/me/attributes/request/";
/// Prefix of attribute response topics.
pub const TOPIC_ATTRIBUTES_RESPONSE: &str = "v1/devices/me/attributes/response/";
/// Wildcard subscription covering every attribute response.
pub const TOPIC_ATTRIBUTES_RESPONSE_ALL: &str = "v1/devices/me/attributes/response/+";

/// Returns the request topic of `request_id`.
#[must_use]
pub fn attributes_request_topic(request_id: u32) -> String {
    format!("{TOPIC_ATTRIBUTES_REQUEST}{request_id}")
}

/// Extracts the request id from a response topic.
#[must_use]
pub fn response_request_id(topic: &str) -> Option<u32> {
    topic
        .strip_prefix(TOPIC_ATTRIBUTES_RESPONSE)
        .and_then(|id| id.parse().ok())
}

/// Device access token, used as MQTT username.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceToken(String);

impl DeviceToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for DeviceToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceToken")
            .field(&mask_password(&self.0))
            .finish()
    }
}

/// Body of an attribute request. Empty key lists are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_keys: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_keys: Option<String>,
}

impl AttributeRequest {
    #[must_use]
    pub fn new<S: AsRef<str>>(client_keys: &[S], shared_keys: &[S]) -> Self {
        fn join<S: AsRef<str>>(keys: &[S]) -> Option<String> {
            (!keys.is_empty()).then(|| {
                keys.iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(",")
            })
        }

        Self {
            client_keys: join(client_keys),
            shared_keys: join(shared_keys),
        }
    }
}

/// Answer to an attribute request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeResponse {
    #[serde(default)]
    pub client: Map<String, Value>,
    #[serde(default)]
    pub shared: Map<String, Value>,
}

impl AttributeResponse {
    /// Looks a key up in the client attributes, then the shared ones.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.client.get(key).or_else(|| self.shared.get(key))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_empty_lists() {
        let request = AttributeRequest::new(&["a", "b"], &[]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"clientKeys": "a,b"})
        );

        let request = AttributeRequest::new::<&str>(&[], &[]);
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({}));
    }

    #[test]
    fn response_topic_id() {
        assert_eq!(response_request_id("v1/devices/me/attributes/response/17"), Some(17));
        assert_eq!(response_request_id("v1/devices/me/attributes/response/x"), None);
        assert_eq!(response_request_id("v1/devices/me/attributes"), None);
        assert_eq!(attributes_request_topic(17), "v1/devices/me/attributes/request/17");
    }

    #[test]
    fn response_with_missing_sections() {
        let response: AttributeResponse =
            serde_json::from_value(json!({"shared": {"targetTemp": 21}})).unwrap();
        assert!(response.client.is_empty());
        assert_eq!(response.get("targetTemp"), Some(&json!(21)));
    }

    #[test]
    fn token_debug_is_masked() {
        let token = DeviceToken::new("A1_TEST_TOKEN");
        assert!(!format!("{token:?}").contains("TEST"));
        assert_eq!(token.as_str(), "A1_TEST_TOKEN");
    }
}
