// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT client acting as a single device.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use url::Url;

use super::payload::{
    AttributeRequest, AttributeResponse, DeviceToken, TOPIC_ATTRIBUTES,
    TOPIC_ATTRIBUTES_RESPONSE_ALL, TOPIC_TELEMETRY, attributes_request_topic,
    response_request_id,
};
use crate::config::ReconnectionPolicy;
use crate::error::{ProtocolError, Result};
use crate::subscription::{AttrUpdate, CallbackRegistry, Subscribable, SubscriptionId};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default MQTT keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Default time to wait for the broker's CONNACK.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for an attribute response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type PendingRequests = Mutex<HashMap<u32, oneshot::Sender<AttributeResponse>>>;

/// State shared between the client handle and its event loop task.
#[derive(Default)]
struct Shared {
    callbacks: CallbackRegistry,
    pending: PendingRequests,
    next_request_id: AtomicU32,
    connected: AtomicBool,
    closing: AtomicBool,
    attributes_subscribed: AtomicBool,
    responses_subscribed: AtomicBool,
}

impl Shared {
    fn handle_publish(&self, topic: &str, payload: &[u8]) {
        tracing::debug!(topic = %topic, bytes = payload.len(), "Received MQTT message");

        if topic == TOPIC_ATTRIBUTES {
            match serde_json::from_slice::<Map<String, Value>>(payload) {
                Ok(attributes) => {
                    let now = chrono::Utc::now().timestamp_millis();
                    let updates: Vec<AttrUpdate> = attributes
                        .iter()
                        .map(|(key, value)| AttrUpdate::new(key.clone(), now, value.clone()))
                        .collect();
                    self.callbacks.dispatch_attributes(&attributes);
                    self.callbacks.dispatch_updates(&updates);
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed attribute push"),
            }
            return;
        }

        let Some(request_id) = response_request_id(topic) else {
            return;
        };
        let Some(sender) = self.pending.lock().remove(&request_id) else {
            tracing::debug!(request_id, "Ignoring response to unknown request");
            return;
        };
        match serde_json::from_slice::<AttributeResponse>(payload) {
            // requester may have timed out already
            Ok(response) => {
                let _ = sender.send(response);
            }
            Err(e) => tracing::warn!(request_id, error = %e, "Ignoring malformed attribute response"),
        }
    }

    /// Topics the broker has to know about after a fresh session.
    fn subscribed_topics(&self) -> Vec<&'static str> {
        let mut topics = Vec::new();
        if self.attributes_subscribed.load(Ordering::SeqCst) {
            topics.push(TOPIC_ATTRIBUTES);
        }
        if self.responses_subscribed.load(Ordering::SeqCst) {
            topics.push(TOPIC_ATTRIBUTES_RESPONSE_ALL);
        }
        topics
    }

    /// Re-issues the subscriptions lost with the previous clean session.
    fn resubscribe(&self, client: &AsyncClient) {
        for topic in self.subscribed_topics() {
            match client.try_subscribe(topic, QoS::AtLeastOnce) {
                Ok(()) => tracing::debug!(topic = %topic, "Resubscribed after reconnect"),
                Err(e) => tracing::warn!(topic = %topic, error = %e, "Resubscribe failed"),
            }
        }
    }

    /// Drops every pending request so waiting callers fail fast.
    fn fail_pending(&self) {
        self.pending.lock().clear();
    }
}

/// MQTT client for one device, authenticated by its access token.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use serde_json::json;
/// use tbkit::mqtt::DeviceMqttClient;
/// use tbkit::subscription::Subscribable;
///
/// # async fn example() -> tbkit::Result<()> {
/// let client = DeviceMqttClient::connect("mqtt://localhost:1883", "A1_TEST_TOKEN").await?;
///
/// client.send_telemetry(&json!({"temperature": 21.5})).await?;
/// client.on_key("targetTemp", |update| println!("new target: {}", update.value_text()));
/// client.subscribe_shared_attributes(|attributes| println!("{attributes:?}")).await?;
///
/// let response = client
///     .request_attributes(&["firmware"], &["targetTemp"], Duration::from_secs(5))
///     .await?;
/// println!("{:?}", response.get("targetTemp"));
/// # Ok(())
/// # }
/// ```
pub struct DeviceMqttClient {
    client: AsyncClient,
    shared: Arc<Shared>,
}

impl DeviceMqttClient {
    /// Connects to the broker as the device owning `token`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the broker does not accept the
    /// connection.
    pub async fn connect(broker_url: &str, token: impl Into<DeviceToken>) -> Result<Self> {
        DeviceMqttClientBuilder::new()
            .broker(broker_url)
            .token(token)
            .build()
            .await
    }

    /// Returns a builder for custom client settings.
    #[must_use]
    pub fn builder() -> DeviceMqttClientBuilder {
        DeviceMqttClientBuilder::new()
    }

    /// Returns true while the broker connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn publish_json<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_vec(payload)?;
        tracing::debug!(topic = %topic, bytes = payload.len(), "Publishing MQTT message");

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(ProtocolError::Mqtt)?;
        Ok(())
    }

    async fn ensure_subscribed(&self, flag: &AtomicBool, topic: &str) -> Result<()> {
        if flag.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            flag.store(false, Ordering::SeqCst);
            return Err(ProtocolError::Mqtt(e).into());
        }
        tracing::debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    /// Publishes telemetry, e.g. `{"temperature": 21.5}` or
    /// `{"ts": 1617975311084, "values": {...}}`.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be queued.
    pub async fn send_telemetry<T: Serialize + ?Sized>(&self, telemetry: &T) -> Result<()> {
        self.publish_json(TOPIC_TELEMETRY, telemetry).await
    }

    /// Publishes client-side attributes.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be queued.
    pub async fn send_client_attributes<T: Serialize + ?Sized>(&self, attributes: &T) -> Result<()> {
        self.publish_json(TOPIC_ATTRIBUTES, attributes).await
    }

    /// Calls `listener` with the attribute map of every shared attribute push.
    ///
    /// Pushes are also dispatched as [`AttrUpdate`]s to the listeners
    /// registered through [`Subscribable`].
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be queued.
    pub async fn subscribe_shared_attributes<F>(&self, listener: F) -> Result<SubscriptionId>
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        let id = self.shared.callbacks.on_attributes(listener);
        if let Err(e) = self
            .ensure_subscribed(&self.shared.attributes_subscribed, TOPIC_ATTRIBUTES)
            .await
        {
            self.shared.callbacks.unsubscribe(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Starts receiving shared attribute pushes without a map listener.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be queued.
    pub async fn watch_attributes(&self) -> Result<()> {
        self.ensure_subscribed(&self.shared.attributes_subscribed, TOPIC_ATTRIBUTES)
            .await
    }

    /// Requests client and shared attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Timeout`] if no response arrives in time, or
    /// [`ProtocolError::ChannelClosed`] if the connection was given up.
    pub async fn request_attributes<S: AsRef<str>>(
        &self,
        client_keys: &[S],
        shared_keys: &[S],
        timeout: Duration,
    ) -> Result<AttributeResponse> {
        self.ensure_subscribed(&self.shared.responses_subscribed, TOPIC_ATTRIBUTES_RESPONSE_ALL)
            .await?;

        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);

        let request = AttributeRequest::new(client_keys, shared_keys);
        if let Err(e) = self
            .publish_json(&attributes_request_topic(request_id), &request)
            .await
        {
            self.shared.pending.lock().remove(&request_id);
            return Err(e);
        }

        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed("MQTT connection closed".into()).into()),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                tracing::debug!(request_id, timeout_ms, "Attribute request timed out");
                Err(ProtocolError::Timeout(timeout_ms).into())
            }
        }
    }

    /// Disconnects from the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect cannot be queued.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.client.disconnect().await.map_err(ProtocolError::Mqtt)?;
        tracing::info!("MQTT client disconnecting");
        Ok(())
    }
}

impl Drop for DeviceMqttClient {
    fn drop(&mut self) {
        // the event loop holds a client clone, so it would never see the channel close
        if !self.shared.closing.swap(true, Ordering::SeqCst) {
            let _ = self.client.try_disconnect();
        }
    }
}

impl Subscribable for DeviceMqttClient {
    fn callbacks(&self) -> &CallbackRegistry {
        &self.shared.callbacks
    }
}

impl std::fmt::Debug for DeviceMqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMqttClient")
            .field("connected", &self.is_connected())
            .field("callbacks", &self.shared.callbacks)
            .finish_non_exhaustive()
    }
}

/// Parses an MQTT URL into host and port.
///
/// Bare host names are accepted; the port defaults to 1883 and IPv6
/// literals lose their brackets.
pub(crate) fn parse_mqtt_url(url: &str) -> std::result::Result<(String, u16), ProtocolError> {
    let parsed = if url.contains("://") {
        Url::parse(url)
    } else {
        Url::parse(&format!("mqtt://{url}"))
    }
    .map_err(|e| ProtocolError::InvalidAddress(format!("{url}: {e}")))?;

    if !matches!(parsed.scheme(), "mqtt" | "tcp") {
        return Err(ProtocolError::InvalidAddress(format!(
            "unsupported scheme {} in {url}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProtocolError::InvalidAddress("empty broker address".to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    Ok((host.to_string(), parsed.port().unwrap_or(1883)))
}

/// Drives the event loop, retrying connection errors per `policy`.
async fn handle_mqtt_events(
    mut event_loop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    policy: ReconnectionPolicy,
    mut connected_tx: Option<oneshot::Sender<()>>,
) {
    let mut attempt = 0;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
                shared.connected.store(true, Ordering::SeqCst);
                attempt = 0;
                // clean sessions lose subscriptions on every reconnect
                match connected_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => shared.resubscribe(&client),
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.handle_publish(&publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                shared.connected.store(false, Ordering::SeqCst);
                if shared.closing.load(Ordering::SeqCst) {
                    tracing::debug!("MQTT event loop closed");
                    break;
                }
                if !policy.should_retry(attempt) {
                    tracing::error!(error = %e, attempts = attempt, "MQTT connection given up");
                    break;
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(error = %e, attempt = attempt + 1, ?delay, "MQTT connection error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }

    shared.fail_pending();
}

/// Builder for a [`DeviceMqttClient`].
#[derive(Debug, Default)]
pub struct DeviceMqttClientBuilder {
    broker: Option<String>,
    token: Option<DeviceToken>,
    client_id: Option<String>,
    keep_alive: Option<Duration>,
    connect_timeout: Option<Duration>,
    policy: Option<ReconnectionPolicy>,
}

impl DeviceMqttClientBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the MQTT broker URL (`mqtt://host:port`, `tcp://host:port` or
    /// `host:port`).
    #[must_use]
    pub fn broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = Some(broker.into());
        self
    }

    /// Sets the device access token.
    #[must_use]
    pub fn token(mut self, token: impl Into<DeviceToken>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets a custom client ID.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = Some(duration);
        self
    }

    /// Sets how long to wait for the broker to accept the connection.
    #[must_use]
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Sets the policy for connection errors.
    #[must_use]
    pub fn reconnection_policy(mut self, policy: ReconnectionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Builds the client and waits until the broker accepts it.
    ///
    /// # Errors
    ///
    /// Returns error if required fields are missing, the connection is
    /// refused, or the broker does not answer in time.
    pub async fn build(self) -> Result<DeviceMqttClient> {
        let broker = self
            .broker
            .ok_or_else(|| ProtocolError::InvalidAddress("broker is required".to_string()))?;
        let token = self
            .token
            .ok_or_else(|| ProtocolError::AuthenticationFailed("device token is required".to_string()))?;

        let (host, port) = parse_mqtt_url(&broker)?;

        let client_id = self.client_id.unwrap_or_else(|| {
            let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("tbkit_{}_{}", std::process::id(), counter)
        });

        let mut mqtt_options = MqttOptions::new(&client_id, host, port);
        mqtt_options.set_keep_alive(self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE));
        mqtt_options.set_clean_session(true);
        mqtt_options.set_credentials(token.as_str(), "");

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let shared = Arc::new(Shared::default());
        let (connected_tx, connected_rx) = oneshot::channel();

        tokio::spawn(handle_mqtt_events(
            event_loop,
            client.clone(),
            Arc::clone(&shared),
            self.policy.unwrap_or_default(),
            Some(connected_tx),
        ));

        let timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;

        match tokio::time::timeout(timeout, connected_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(ProtocolError::ConnectionFailed(format!(
                    "broker {broker} refused the connection"
                ))
                .into());
            }
            Err(_) => {
                // stop the event loop from retrying in the background
                shared.closing.store(true, Ordering::SeqCst);
                let _ = client.try_disconnect();
                return Err(ProtocolError::Timeout(timeout_ms).into());
            }
        }

        tracing::info!(client_id = %client_id, broker = %broker, "Device MQTT client connected");

        Ok(DeviceMqttClient { client, shared })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use serde_json::json;

    use super::*;

    #[test]
    fn parse_mqtt_url_with_port() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("thingsboard").unwrap();
        assert_eq!(host, "thingsboard");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_input() {
        assert!(parse_mqtt_url("mqtt://host:port").is_err());
        assert!(parse_mqtt_url("mqtt://").is_err());
        assert!(parse_mqtt_url("http://broker").is_err());
    }

    #[test]
    fn parse_mqtt_url_ipv6() {
        let (host, port) = parse_mqtt_url("mqtt://[::1]:1884").unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 1884);
    }

    #[tokio::test]
    async fn builder_requires_broker_and_token() {
        let err = DeviceMqttClientBuilder::new().token("t").build().await.unwrap_err();
        assert!(err.to_string().contains("broker is required"));

        let err = DeviceMqttClientBuilder::new()
            .broker("localhost")
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("device token is required"));
    }

    #[test]
    fn attribute_push_reaches_listeners() {
        let shared = Shared::default();
        let maps = Arc::new(AtomicU32::new(0));
        let maps_clone = maps.clone();
        let values = Arc::new(Mutex::new(Vec::new()));
        let values_clone = values.clone();

        shared.callbacks.on_attributes(move |attrs| {
            assert!(attrs.contains_key("targetTemp"));
            maps_clone.fetch_add(1, Ordering::SeqCst);
        });
        shared
            .callbacks
            .on_key("targetTemp", move |update| values_clone.lock().push(update.value.clone()));

        shared.handle_publish(TOPIC_ATTRIBUTES, br#"{"targetTemp": 22, "mode": "eco"}"#);
        shared.handle_publish(TOPIC_ATTRIBUTES, b"not json");

        assert_eq!(maps.load(Ordering::SeqCst), 1);
        assert_eq!(*values.lock(), vec![json!(22)]);
    }

    #[test]
    fn response_completes_matching_request() {
        let shared = Shared::default();
        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(4, tx);

        shared.handle_publish(
            "v1/devices/me/attributes/response/3",
            br#"{"client": {"fw": "1.0"}}"#,
        );
        assert!(rx.try_recv().is_err());

        shared.handle_publish(
            "v1/devices/me/attributes/response/4",
            br#"{"client": {"fw": "1.0"}, "shared": {"targetTemp": 21}}"#,
        );
        let response = rx.try_recv().unwrap();
        assert_eq!(response.client["fw"], "1.0");
        assert_eq!(response.shared["targetTemp"], 21);
        assert!(shared.pending.lock().is_empty());
    }

    #[test]
    fn subscribed_topics_follow_flags() {
        let shared = Shared::default();
        assert!(shared.subscribed_topics().is_empty());

        shared.responses_subscribed.store(true, Ordering::SeqCst);
        assert_eq!(shared.subscribed_topics(), vec![TOPIC_ATTRIBUTES_RESPONSE_ALL]);

        shared.attributes_subscribed.store(true, Ordering::SeqCst);
        assert_eq!(
            shared.subscribed_topics(),
            vec![TOPIC_ATTRIBUTES, TOPIC_ATTRIBUTES_RESPONSE_ALL]
        );
    }

    #[test]
    fn fail_pending_closes_requests() {
        let shared = Shared::default();
        let (tx, mut rx) = oneshot::channel::<AttributeResponse>();
        shared.pending.lock().insert(1, tx);

        shared.fail_pending();
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
