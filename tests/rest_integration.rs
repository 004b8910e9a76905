// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the REST client using wiremock.

#![cfg(feature = "http")]

use serde_json::{Value, json};
use tbkit::entity::{AlarmSeverity, Device, EntityId, EntityType, Scope};
use tbkit::{Error, ProtocolError, RestClient, TbConfig};
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "jwt-token";

fn page(data: Value) -> Value {
    let total = data.as_array().map_or(0, Vec::len);
    json!({"data": data, "totalPages": 1, "totalElements": total, "hasNext": false})
}

fn device_json(id: Uuid, name: &str, profile: &str) -> Value {
    json!({
        "id": {"entityType": "DEVICE", "id": id},
        "name": name,
        "type": profile,
        "additionalInfo": {"gateway": false}
    })
}

fn profile_json(id: Uuid, name: &str) -> Value {
    json!({"id": {"entityType": "DEVICE_PROFILE", "id": id}, "name": name})
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": TOKEN, "refreshToken": "refresh"})),
        )
        .mount(server)
        .await;
}

async fn logged_in(server: &MockServer) -> RestClient {
    mount_login(server).await;
    let config = TbConfig::from_url(&server.uri())
        .unwrap()
        .with_credentials("tenant@thingsboard.org", "tenant");
    RestClient::connect(&config).await.unwrap()
}

async fn mount_profiles(server: &MockServer, profiles: Value) {
    Mock::given(method("GET"))
        .and(path("/api/deviceProfiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(profiles)))
        .mount(server)
        .await;
}

// ============================================================================
// Authentication
// ============================================================================

mod authentication {
    use super::*;

    #[tokio::test]
    async fn login_stores_session() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        assert_eq!(client.token().as_deref(), Some(TOKEN));
        assert_eq!(client.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(client.username().as_deref(), Some("tenant@thingsboard.org"));
    }

    #[tokio::test]
    async fn rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = RestClient::new(&TbConfig::from_url(&server.uri()).unwrap()).unwrap();
        let err = client.login("tenant@thingsboard.org", "wrong").await.unwrap_err();

        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AuthenticationFailed(ref user)) if user == "tenant@thingsboard.org"
        ));
        assert!(client.token().is_none());
    }

    #[tokio::test]
    async fn requests_carry_token() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/api/device/{id}")))
            .and(header("X-Authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-1", "press")))
            .expect(1)
            .mount(&server)
            .await;

        let device: Device = client.get_entity(id).await.unwrap().unwrap();
        assert_eq!(device.name, "press-1");
        assert_eq!(device.profile_name(), Some("press"));
    }

    #[tokio::test]
    async fn refresh_replaces_token() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .and(body_json(json!({"refreshToken": "refresh"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": "jwt-2", "refreshToken": "refresh-2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client.refresh_session().await.unwrap();

        assert_eq!(client.token().as_deref(), Some("jwt-2"));
        assert_eq!(client.refresh_token().as_deref(), Some("refresh-2"));
        assert_eq!(client.username().as_deref(), Some("tenant@thingsboard.org"));
        let refresh = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.url.path() == "/api/auth/token")
            .unwrap();
        assert!(!refresh.headers.contains_key("x-authorization"));
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_session() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client.refresh_session().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AuthenticationFailed(_))
        ));
        assert_eq!(client.token().as_deref(), Some(TOKEN));
    }

    #[tokio::test]
    async fn refresh_needs_session() {
        let client = RestClient::new(&TbConfig::new("127.0.0.1").with_port(9)).unwrap();
        assert!(matches!(
            client.refresh_session().await,
            Err(Error::Protocol(ProtocolError::NotAuthenticated))
        ));
    }

    #[tokio::test]
    async fn change_password() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/auth/changePassword"))
            .and(body_json(json!({"currentPassword": "tenant", "newPassword": "s3cret"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client.change_password("tenant", "s3cret").await.unwrap();
    }
}

// ============================================================================
// Entities
// ============================================================================

mod entities {
    use super::*;

    #[tokio::test]
    async fn missing_entity_is_none() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("deviceName", "ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client.get_tenant_device("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_fields_survive_round_trip() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/api/device/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-1", "press")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/device"))
            .and(body_json(device_json(id, "press-1", "press")))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-1", "press")))
            .expect(1)
            .mount(&server)
            .await;

        let device: Device = client.get_entity(id).await.unwrap().unwrap();
        client.save_entity(&device).await.unwrap();
    }

    #[tokio::test]
    async fn listing_walks_all_pages() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [device_json(Uuid::new_v4(), "a", "press")],
                "hasNext": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [device_json(Uuid::new_v4(), "b", "press")],
                "hasNext": false
            })))
            .mount(&server)
            .await;

        let devices = client.get_tenant_devices(None).await.unwrap();
        let names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn delete_unknown_entity_is_client_error() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("DELETE"))
            .and(path(format!("/api/dashboard/{id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client.delete_entity(EntityType::Dashboard, id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn activate_user_from_link() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/api/user/{user}/activationLink")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("http://tb.local/api/noauth/activate?activateToken=abc123"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/noauth/activate"))
            .and(body_json(json!({"activateToken": "abc123", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let link = client.get_activation_link(user).await.unwrap();
        client.activate_user_from_link(&link, "pw").await.unwrap();
    }
}

// ============================================================================
// Devices
// ============================================================================

mod devices {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_matching_device() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("deviceName", "press-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-1", "press")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/device"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let device = client.get_or_create_device("press-1", "press").await.unwrap();
        assert_eq!(device.id, Some(EntityId::device(id)));
    }

    #[tokio::test]
    async fn get_or_create_creates_missing_device() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("deviceName", "press-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/device"))
            .and(body_json(json!({"name": "press-2", "type": "press"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-2", "press")))
            .expect(1)
            .mount(&server)
            .await;

        let device = client.get_or_create_device("press-2", "press").await.unwrap();
        assert_eq!(device.id.map(|i| i.id), Some(id));
    }

    #[tokio::test]
    async fn get_or_create_moves_device_to_profile() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();
        let profile_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("deviceName", "press-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-3", "default")))
            .mount(&server)
            .await;
        mount_profiles(&server, json!([profile_json(profile_id, "press")])).await;
        Mock::given(method("POST"))
            .and(path("/api/device"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-3", "press")))
            .expect(1)
            .mount(&server)
            .await;

        let device = client.get_or_create_device("press-3", "press").await.unwrap();
        assert_eq!(device.profile_name(), Some("press"));

        let requests = server.received_requests().await.unwrap();
        let saved: Value = requests
            .iter()
            .rfind(|r| r.method == wiremock::http::Method::POST && r.url.path() == "/api/device")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        assert_eq!(saved["type"], "press");
        assert_eq!(saved["deviceProfileId"]["id"], profile_id.to_string());
    }

    #[tokio::test]
    async fn devices_of_unknown_profile() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        mount_profiles(&server, json!([profile_json(Uuid::new_v4(), "default")])).await;

        let err = client.devices_by_profile("press").await.unwrap_err();
        assert!(matches!(err, Error::Entity(_)));
    }

    #[tokio::test]
    async fn device_token_by_name() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/api/tenant/devices"))
            .and(query_param("deviceName", "press-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_json(id, "press-1", "press")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/device/{id}/credentials")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "credentialsType": "ACCESS_TOKEN",
                "credentialsId": "A1_TEST_TOKEN"
            })))
            .mount(&server)
            .await;

        let token = client.device_token_by_name("press-1").await.unwrap();
        assert_eq!(token.as_deref(), Some("A1_TEST_TOKEN"));
    }
}

// ============================================================================
// Telemetry and attributes
// ============================================================================

mod telemetry {
    use super::*;

    #[tokio::test]
    async fn send_single_value() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!(
                "/api/plugins/telemetry/DEVICE/{id}/timeseries/CLIENT_SCOPE"
            )))
            .and(body_json(json!({"temperature": 21.5})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .send_telemetry_value(id, "temperature", 21.5)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn read_single_attribute() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!(
                "/api/plugins/telemetry/DEVICE/{id}/values/attributes/SERVER_SCOPE"
            )))
            .and(query_param("keys", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"key": "active", "value": true, "lastUpdateTs": 1_700_000_000_000_i64}
            ])))
            .mount(&server)
            .await;

        let value = client
            .get_attribute(id, Scope::ServerScope, "active")
            .await
            .unwrap();
        assert_eq!(value, Some(json!(true)));
    }

    #[tokio::test]
    async fn shared_attributes_use_plugin_api() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/api/plugins/telemetry/{id}/SHARED_SCOPE")))
            .and(body_json(json!({"speed": 3})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .save_attribute(id, Scope::SharedScope, "speed", 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn client_attributes_use_device_api() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/api/device/{id}/credentials")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "credentialsType": "ACCESS_TOKEN",
                "credentialsId": "A1_TEST_TOKEN"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/A1_TEST_TOKEN/attributes"))
            .and(body_json(json!({"fw": "1.2"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .save_attribute(id, Scope::ClientScope, "fw", "1.2")
            .await
            .unwrap();
    }
}

// ============================================================================
// Alarms
// ============================================================================

mod alarms {
    use super::*;

    fn alarm_json(id: Uuid, device: Uuid, alarm_type: &str, status: &str) -> Value {
        json!({
            "id": {"entityType": "ALARM", "id": id},
            "originator": {"entityType": "DEVICE", "id": device},
            "type": alarm_type,
            "severity": "MAJOR",
            "status": status
        })
    }

    async fn mount_active_alarms(server: &MockServer, device: Uuid, alarms: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/alarm/DEVICE/{device}")))
            .and(query_param("searchStatus", "ACTIVE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(alarms)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn no_new_alarm_while_active() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let device = Uuid::new_v4();

        mount_active_alarms(
            &server,
            device,
            json!([alarm_json(Uuid::new_v4(), device, "Overheat", "ACTIVE_UNACK")]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/api/alarm"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let created = client
            .new_alarm_if_not_active(EntityId::device(device), "press-1", "Overheat", AlarmSeverity::Major)
            .await
            .unwrap();
        assert!(created.is_none());
    }

    #[tokio::test]
    async fn new_alarm_when_none_active() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let device = Uuid::new_v4();
        let alarm = Uuid::new_v4();

        mount_active_alarms(&server, device, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/api/alarm"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(alarm_json(alarm, device, "Overheat", "ACTIVE_UNACK")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let created = client
            .new_alarm_if_not_active(EntityId::device(device), "press-1", "Overheat", AlarmSeverity::Major)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.id.map(|i| i.id), Some(alarm));
    }

    #[tokio::test]
    async fn clear_active_alarm() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        let device = Uuid::new_v4();
        let alarm = Uuid::new_v4();

        mount_active_alarms(
            &server,
            device,
            json!([alarm_json(alarm, device, "Overheat", "ACTIVE_ACK")]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path(format!("/api/alarm/{alarm}/clear")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cleared = client
            .clear_alarm_if_active(EntityId::device(device), "press-1", "Overheat")
            .await
            .unwrap();
        assert!(cleared.is_some());
    }
}
