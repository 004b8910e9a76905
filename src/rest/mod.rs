// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! REST client for the platform API.
//!
//! [`RestClient`] logs in with JWT credentials and exposes typed helpers for
//! entities, telemetry, attributes and alarms. It is a cheap handle over a
//! shared connection pool; clone it freely.
//!
//! # Examples
//!
//! ```no_run
//! use tbkit::{RestClient, TbConfig};
//! use tbkit::entity::Scope;
//!
//! # async fn example() -> tbkit::Result<()> {
//! let client = RestClient::connect(&TbConfig::new("localhost").with_port(9090)).await?;
//!
//! let device = client.get_or_create_device("press-1", "default").await?;
//! if let Some(id) = device.id {
//!     client.send_telemetry_value(id.id, "pressure", 4.2).await?;
//!     client.save_attribute(id.id, Scope::ServerScope, "line", "L4").await?;
//! }
//! # Ok(())
//! # }
//! ```

mod alarm;
mod entities;
mod telemetry;

pub use alarm::find_active_alarm;

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{TbConfig, mask_password};
use crate::entity::{PageData, PageLink};
use crate::error::{ProtocolError, Result};

/// Header carrying the JWT on every authenticated request.
const AUTH_HEADER: &str = "X-Authorization";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

struct Session {
    username: String,
    token: String,
    refresh_token: Option<String>,
}

struct Inner {
    base_url: String,
    http: Client,
    session: RwLock<Option<Session>>,
}

/// Authenticated REST client.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl RestClient {
    /// Creates a client for the configured instance without logging in.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &TbConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(Self {
            inner: Arc::new(Inner {
                base_url: config.base_url(),
                http,
                session: RwLock::new(None),
            }),
        })
    }

    /// Creates a client and logs in with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] if the platform rejects
    /// the credentials, or any transport error.
    pub async fn connect(config: &TbConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login(config.username(), config.password()).await?;
        Ok(client)
    }

    /// Returns the REST base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Returns the current JWT, if logged in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner.session.read().as_ref().map(|s| s.token.clone())
    }

    /// Returns the refresh token of the current session, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    /// Returns the user of the current session.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.inner.session.read().as_ref().map(|s| s.username.clone())
    }

    /// Logs in and stores the returned JWT for subsequent requests.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] on rejected credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "/api/auth/login")
            .json(&LoginRequest { username, password });

        let body = match self.send(request).await {
            Ok(body) => body,
            Err(e) if e.is_client_error() => {
                tracing::warn!(
                    user = %username,
                    password = %mask_password(password),
                    "Login failed"
                );
                return Err(ProtocolError::AuthenticationFailed(username.to_string()).into());
            }
            Err(e) => return Err(e),
        };

        let response: LoginResponse = serde_json::from_str(&body)?;
        *self.inner.session.write() = Some(Session {
            username: username.to_string(),
            token: response.token,
            refresh_token: response.refresh_token,
        });

        tracing::info!(user = %username, url = %self.inner.base_url, "Logged in");
        Ok(())
    }

    /// Exchanges the refresh token of the session for a new JWT.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotAuthenticated`] without a refresh token,
    /// or [`ProtocolError::AuthenticationFailed`] if the platform rejects it.
    pub async fn refresh_session(&self) -> Result<()> {
        let (username, refresh_token) = self
            .inner
            .session
            .read()
            .as_ref()
            .and_then(|s| Some((s.username.clone(), s.refresh_token.clone()?)))
            .ok_or(ProtocolError::NotAuthenticated)?;

        // the expired JWT must not be sent along
        let request = self
            .inner
            .http
            .post(self.url("/api/auth/token"))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            });
        let body = match self.send(request).await {
            Ok(body) => body,
            Err(e) if e.is_client_error() => {
                tracing::warn!(user = %username, "Token refresh rejected");
                return Err(ProtocolError::AuthenticationFailed(username).into());
            }
            Err(e) => return Err(e),
        };

        let response: LoginResponse = serde_json::from_str(&body)?;
        tracing::debug!(user = %username, "Session refreshed");
        *self.inner.session.write() = Some(Session {
            username,
            token: response.token,
            refresh_token: response.refresh_token.or(Some(refresh_token)),
        });
        Ok(())
    }

    /// Changes the password of the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the current password is wrong or the
    /// new one violates the password policy.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        self.post_unit(
            "/api/auth/changePassword",
            &ChangePasswordRequest {
                current_password,
                new_password,
            },
        )
        .await
    }

    /// Builds the absolute URL of an API path.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        tracing::debug!(method = %method, path = %path, "Sending REST request");

        let builder = self.inner.http.request(method, self.url(path));
        match self.token() {
            Some(token) => builder.header(AUTH_HEADER, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Sends a request and returns the body of a successful answer.
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await.map_err(ProtocolError::Http)?;
        let status = response.status();
        let body = response.text().await.map_err(ProtocolError::Http)?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), body = %body, "REST request rejected");
            return Err(ProtocolError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(body)
    }

    pub(crate) async fn get_text(&self, path: &str) -> Result<String> {
        self.send(self.request(Method::GET, path)).await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_text(path).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET that maps 404 and empty answers to `None`.
    pub(crate) async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get_text(path).await {
            Ok(body) if body.trim().is_empty() => Ok(None),
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub(crate) async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(self.request(Method::POST, path).json(body))
            .await
            .map(|_| ())
    }

    pub(crate) async fn post_empty(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::POST, path)).await.map(|_| ())
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path))
            .await
            .map(|_| ())
    }

    /// Walks every page of a paged listing.
    ///
    /// `filter` is appended verbatim to the paging query, e.g. `&type=press`.
    pub(crate) async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &str,
    ) -> Result<Vec<T>> {
        let mut link = PageLink::default();
        let mut all = Vec::new();

        loop {
            let page: PageData<T> = self
                .get_json(&format!("{path}?{}{filter}", link.to_query()))
                .await?;
            all.extend(page.data);
            if !page.has_next {
                break;
            }
            link = link.next_page();
        }

        Ok(all)
    }

    /// Sends a request built outside the usual helpers, with authentication.
    pub(crate) async fn send_raw(
        &self,
        method: Method,
        path: &str,
        configure: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<String> {
        self.send(configure(self.request(method, path))).await
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.base_url)
            .field("user", &self.username())
            .finish_non_exhaustive()
    }
}
