// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the device MQTT client using mockforge-mqtt.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use serde_json::json;
use tbkit::mqtt::DeviceMqttClient;
use tbkit::subscription::Subscribable;
use tbkit::{Error, ProtocolError, ReconnectionPolicy};
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind before clients connect
    sleep(Duration::from_millis(500)).await;
}

async fn connected_client() -> DeviceMqttClient {
    let port = get_test_port();
    start_mock_broker(port).await;
    DeviceMqttClient::connect(&format!("mqtt://127.0.0.1:{port}"), "A1_TEST_TOKEN")
        .await
        .unwrap()
}

// ============================================================================
// Connection
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let client = connected_client().await;
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn connect_without_scheme() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let result = DeviceMqttClient::builder()
            .broker(format!("127.0.0.1:{port}"))
            .token("A1_TEST_TOKEN")
            .client_id("press-1")
            .build()
            .await;

        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let result = DeviceMqttClient::builder()
            .broker("mqtt://127.0.0.1:1")
            .build()
            .await;

        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::AuthenticationFailed(_)))
        ));
    }

    #[tokio::test]
    async fn unreachable_broker_fails() {
        let port = get_test_port();

        let result = DeviceMqttClient::builder()
            .broker(format!("mqtt://127.0.0.1:{port}"))
            .token("A1_TEST_TOKEN")
            .connect_timeout(Duration::from_secs(2))
            .reconnection_policy(ReconnectionPolicy::disabled())
            .build()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disconnect() {
        let client = connected_client().await;
        client.disconnect().await.unwrap();
    }
}

// ============================================================================
// Publishing and requests
// ============================================================================

mod messaging {
    use super::*;

    #[tokio::test]
    async fn publish_telemetry_and_attributes() {
        let client = connected_client().await;

        client
            .send_telemetry(&json!({"temperature": 21.5}))
            .await
            .unwrap();
        client
            .send_telemetry(&json!({"ts": 1_700_000_000_000_i64, "values": {"pressure": 1.2}}))
            .await
            .unwrap();
        client
            .send_client_attributes(&json!({"firmware": "1.2.0"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn shared_attribute_listener_registration() {
        let client = connected_client().await;

        let id = client
            .subscribe_shared_attributes(|attributes| println!("{attributes:?}"))
            .await
            .unwrap();
        client.watch_attributes().await.unwrap();

        assert!(client.unsubscribe_listener(id));
        assert!(!client.unsubscribe_listener(id));
    }

    #[tokio::test]
    async fn attribute_request_times_out_without_answer() {
        let client = connected_client().await;

        let err = client
            .request_attributes(&["firmware"], &["targetTemp"], Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Protocol(ProtocolError::Timeout(300))));
    }
}

// ============================================================================
// Scripted broker
// ============================================================================

/// A minimal MQTT 3.1.1 broker that answers one connection at a time.
///
/// mockforge-mqtt does not route publishes back to clients, so the
/// round trips below run against this instead. Attribute requests are
/// answered with a fixed payload, and the test can push shared attribute
/// updates or cut the connection.
mod scripted {
    use std::sync::Arc;

    use serde_json::{Map, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
    use tokio::time::timeout;

    use super::*;

    const ATTRIBUTES: &str = "v1/devices/me/attributes";
    const REQUEST_PREFIX: &str = "v1/devices/me/attributes/request/";
    const RESPONSES: &str = "v1/devices/me/attributes/response/+";

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Connected,
        Subscribed(String),
    }

    enum Control {
        Push(String, Vec<u8>),
        Cut,
    }

    struct Broker {
        url: String,
        seen: UnboundedReceiver<Seen>,
        control: UnboundedSender<Control>,
    }

    impl Broker {
        async fn start(answer: Value) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("mqtt://{}", listener.local_addr().unwrap());
            let (seen_tx, seen) = mpsc::unbounded_channel();
            let (control, mut control_rx) = mpsc::unbounded_channel();
            let answer = serde_json::to_vec(&answer).unwrap();

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    if !serve(stream, &answer, &seen_tx, &mut control_rx).await {
                        break;
                    }
                }
            });

            Self { url, seen, control }
        }

        fn push(&self, topic: &str, payload: &Value) {
            let payload = serde_json::to_vec(payload).unwrap();
            self.control
                .send(Control::Push(topic.to_string(), payload))
                .unwrap();
        }

        fn cut(&self) {
            self.control.send(Control::Cut).unwrap();
        }

        /// Waits for the next observation matching `wanted`.
        async fn expect(&mut self, wanted: Seen) {
            let found = timeout(Duration::from_secs(5), async {
                while let Some(seen) = self.seen.recv().await {
                    if seen == wanted {
                        return true;
                    }
                }
                false
            })
            .await;
            assert!(matches!(found, Ok(true)), "never saw {wanted:?}");
        }

        async fn expect_subscriptions(&mut self) {
            let mut missing = vec![ATTRIBUTES.to_string(), RESPONSES.to_string()];
            let done = timeout(Duration::from_secs(5), async {
                while let Some(seen) = self.seen.recv().await {
                    if let Seen::Subscribed(topic) = seen {
                        missing.retain(|t| *t != topic);
                        if missing.is_empty() {
                            return;
                        }
                    }
                }
            })
            .await;
            assert!(done.is_ok(), "subscriptions missing: {missing:?}");
        }
    }

    fn encode_len(mut len: usize, out: &mut Vec<u8>) {
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if len == 0 {
                break;
            }
        }
    }

    fn publish_frame(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);

        let mut frame = vec![0x30];
        encode_len(body.len(), &mut frame);
        frame.extend(body);
        frame
    }

    async fn read_packet(reader: &mut OwnedReadHalf) -> std::io::Result<(u8, Vec<u8>)> {
        let header = reader.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = reader.read_u8().await?;
            len |= usize::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        Ok((header, body))
    }

    fn read_str(body: &[u8], at: usize) -> (String, usize) {
        let len = usize::from(u16::from_be_bytes([body[at], body[at + 1]]));
        let text = String::from_utf8_lossy(&body[at + 2..at + 2 + len]).into_owned();
        (text, at + 2 + len)
    }

    /// Builds the broker's reply to one client packet.
    fn respond(header: u8, body: &[u8], answer: &[u8], seen: &UnboundedSender<Seen>) -> Vec<u8> {
        match header & 0xf0 {
            0x10 => {
                let _ = seen.send(Seen::Connected);
                vec![0x20, 0x02, 0x00, 0x00]
            }
            0x80 => {
                let mut at = 2;
                let mut granted = 0u8;
                while at < body.len() {
                    let (topic, next) = read_str(body, at);
                    let _ = seen.send(Seen::Subscribed(topic));
                    at = next + 1;
                    granted += 1;
                }
                let mut reply = vec![0x90, 2 + granted, body[0], body[1]];
                reply.extend(std::iter::repeat_n(0x01, usize::from(granted)));
                reply
            }
            0x30 => {
                let qos = (header >> 1) & 0x03;
                let (topic, at) = read_str(body, 0);
                let mut reply = Vec::new();
                if qos > 0 {
                    reply.extend_from_slice(&[0x40, 0x02, body[at], body[at + 1]]);
                }
                if let Some(id) = topic.strip_prefix(REQUEST_PREFIX) {
                    let response = format!("v1/devices/me/attributes/response/{id}");
                    reply.extend(publish_frame(&response, answer));
                }
                reply
            }
            0xc0 => vec![0xd0, 0x00],
            _ => Vec::new(),
        }
    }

    /// Serves one connection; returns false once the test has gone away.
    async fn serve(
        stream: TcpStream,
        answer: &[u8],
        seen: &UnboundedSender<Seen>,
        control: &mut UnboundedReceiver<Control>,
    ) -> bool {
        let (mut reader, mut writer) = stream.into_split();
        let (packets_tx, mut packets) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            while let Ok(packet) = read_packet(&mut reader).await {
                if packets_tx.send(packet).is_err() {
                    break;
                }
            }
        });

        let keep_going = loop {
            tokio::select! {
                packet = packets.recv() => {
                    let Some((header, body)) = packet else { break true };
                    if header & 0xf0 == 0xe0 {
                        break true;
                    }
                    let reply = respond(header, &body, answer, seen);
                    if !reply.is_empty() && writer.write_all(&reply).await.is_err() {
                        break true;
                    }
                }
                command = control.recv() => match command {
                    Some(Control::Push(topic, payload)) => {
                        if writer.write_all(&publish_frame(&topic, &payload)).await.is_err() {
                            break true;
                        }
                    }
                    Some(Control::Cut) => break true,
                    None => break false,
                },
            }
        };

        let _ = writer.shutdown().await;
        reader_task.abort();
        keep_going
    }

    fn fast_reconnect() -> ReconnectionPolicy {
        ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(200))
    }

    async fn client_for(broker: &Broker) -> DeviceMqttClient {
        DeviceMqttClient::builder()
            .broker(&broker.url)
            .token("A1_TEST_TOKEN")
            .reconnection_policy(fast_reconnect())
            .build()
            .await
            .unwrap()
    }

    async fn attribute_listener(client: &DeviceMqttClient) -> UnboundedReceiver<Map<String, Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        client
            .subscribe_shared_attributes(move |attributes| {
                let _ = tx.send(attributes.clone());
            })
            .await
            .unwrap();
        rx
    }

    async fn next_push(pushes: &mut UnboundedReceiver<Map<String, Value>>) -> Map<String, Value> {
        timeout(Duration::from_secs(5), pushes.recv())
            .await
            .expect("no attribute push arrived")
            .expect("listener dropped")
    }

    #[tokio::test]
    async fn attribute_request_round_trip() {
        let mut broker = Broker::start(json!({
            "client": {"firmware": "1.2.0"},
            "shared": {"targetTemp": 21}
        }))
        .await;
        let client = client_for(&broker).await;

        let response = client
            .request_attributes(&["firmware"], &["targetTemp"], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.client["firmware"], "1.2.0");
        assert_eq!(response.shared["targetTemp"], 21);
        broker.expect(Seen::Subscribed(RESPONSES.to_string())).await;
    }

    #[tokio::test]
    async fn shared_attribute_push_reaches_listener() {
        let mut broker = Broker::start(json!({})).await;
        let client = client_for(&broker).await;

        let values = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        client.on_key("targetTemp", move |update| sink.lock().push(update.value.clone()));
        let mut pushes = attribute_listener(&client).await;
        broker.expect(Seen::Subscribed(ATTRIBUTES.to_string())).await;

        broker.push(ATTRIBUTES, &json!({"targetTemp": 23, "mode": "eco"}));

        let attributes = next_push(&mut pushes).await;
        assert_eq!(attributes["targetTemp"], 23);
        assert_eq!(attributes["mode"], "eco");
        assert_eq!(*values.lock(), vec![json!(23)]);
    }

    #[tokio::test]
    async fn subscriptions_survive_reconnect() {
        let mut broker = Broker::start(json!({"shared": {"targetTemp": 21}})).await;
        let client = client_for(&broker).await;
        broker.expect(Seen::Connected).await;

        let mut pushes = attribute_listener(&client).await;
        client
            .request_attributes(&[], &["targetTemp"], Duration::from_secs(5))
            .await
            .unwrap();
        broker.expect_subscriptions().await;

        broker.cut();
        broker.expect(Seen::Connected).await;
        broker.expect_subscriptions().await;

        broker.push(ATTRIBUTES, &json!({"targetTemp": 24}));
        assert_eq!(next_push(&mut pushes).await["targetTemp"], 24);

        let response = client
            .request_attributes(&[], &["targetTemp"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.shared["targetTemp"], 21);
        assert!(client.is_connected());
    }
}
