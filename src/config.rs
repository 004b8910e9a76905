// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection settings for a ThingsBoard instance.
//!
//! [`TbConfig`] is built either explicitly with its `with_*` methods or from
//! the `TB_*` environment variables via [`TbConfig::from_env`].
//! [`ReconnectionPolicy`] controls how the MQTT and WebSocket clients retry
//! after losing their connection.

use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ProtocolError};

/// Default tenant administrator of a fresh installation.
pub const TB_TENANT_USER: &str = "tenant@thingsboard.org";
/// Default tenant administrator password of a fresh installation.
pub const TB_TENANT_PW: &str = "tenant";
/// Default system administrator of a fresh installation.
pub const TB_SYSADMIN_USER: &str = "sysadmin@thingsboard.org";
/// Default system administrator password of a fresh installation.
pub const TB_SYSADMIN_PW: &str = "sysadmin";
/// Profile assigned to devices created without an explicit profile.
pub const DEFAULT_DEVICE_PROFILE_NAME: &str = "default";

/// Environment variable names read by [`TbConfig::from_env`].
pub mod env {
    /// Host name of the platform.
    pub const TB_HOST: &str = "TB_HOST";
    /// REST port of the platform.
    pub const TB_REST_PORT: &str = "TB_REST_PORT";
    /// MQTT port of the platform.
    pub const TB_MQTT_PORT: &str = "TB_MQTT_PORT";
    /// Complete REST base URL; takes precedence over host and port.
    pub const TB_URL: &str = "TB_URL";
    /// Login user.
    pub const TB_USER: &str = "TB_USER";
    /// Login password.
    pub const TB_PW: &str = "TB_PW";
    /// Name of the device an application acts for.
    pub const DEVICE_NAME: &str = "DEVICE_NAME";
    /// Profile of the device an application acts for.
    pub const DEVICE_PROFILE: &str = "DEVICE_PROFILE";
}

/// Configuration of a ThingsBoard connection.
///
/// # Examples
///
/// ```
/// use tbkit::TbConfig;
/// use std::time::Duration;
///
/// let config = TbConfig::new("tb.local")
///     .with_port(8080)
///     .with_credentials("tenant@thingsboard.org", "secret")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.base_url(), "http://tb.local:8080");
/// ```
#[derive(Clone)]
pub struct TbConfig {
    host: String,
    port: u16,
    use_https: bool,
    mqtt_port: u16,
    username: String,
    password: String,
    timeout: Duration,
    device_name: Option<String>,
    device_profile: Option<String>,
}

impl TbConfig {
    /// Default host when nothing else is configured.
    pub const DEFAULT_HOST: &'static str = "thingsboard";
    /// Default REST port.
    pub const DEFAULT_PORT: u16 = 9090;
    /// Default MQTT port.
    pub const DEFAULT_MQTT_PORT: u16 = 1883;
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a configuration for the given host with default credentials.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            use_https: false,
            mqtt_port: Self::DEFAULT_MQTT_PORT,
            username: TB_TENANT_USER.to_string(),
            password: TB_TENANT_PW.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            device_name: None,
            device_profile: None,
        }
    }

    /// Creates a configuration from a REST base URL such as `http://tb:9090`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL has no usable host or an invalid port.
    pub fn from_url(url: &str) -> Result<Self, ProtocolError> {
        let parsed = if url.contains("://") {
            Url::parse(url)
        } else {
            Url::parse(&format!("http://{url}"))
        }
        .map_err(|e| ProtocolError::InvalidAddress(format!("{url}: {e}")))?;

        let use_https = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(ProtocolError::InvalidAddress(format!(
                    "unsupported scheme {other} in {url}"
                )));
            }
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProtocolError::InvalidAddress(url.to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ProtocolError::InvalidAddress(url.to_string()))?;

        if parsed.path() != "/" {
            tracing::debug!(path = parsed.path(), "Ignoring path of platform URL");
        }

        let mut config = Self::new(host).with_port(port);
        config.use_https = use_https;
        Ok(config)
    }

    /// Builds a configuration from the `TB_*` environment variables.
    ///
    /// `TB_URL` wins over `TB_HOST`/`TB_REST_PORT`. Missing variables fall
    /// back to the defaults of a local installation.
    ///
    /// # Errors
    ///
    /// Returns error if a port variable or `TB_URL` cannot be parsed.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a port variable or `TB_URL` cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_port = |var: &str, default: u16| -> Result<u16, ConfigError> {
            match lookup(var) {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: var.to_string(),
                    value,
                }),
                None => Ok(default),
            }
        };

        let mut config = match lookup(env::TB_URL) {
            Some(url) => Self::from_url(&url)?,
            None => {
                let host = lookup(env::TB_HOST).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
                Self::new(host).with_port(parse_port(env::TB_REST_PORT, Self::DEFAULT_PORT)?)
            }
        };

        config.mqtt_port = parse_port(env::TB_MQTT_PORT, Self::DEFAULT_MQTT_PORT)?;
        if let Some(user) = lookup(env::TB_USER) {
            config.username = user;
        }
        if let Some(password) = lookup(env::TB_PW) {
            config.password = password;
        }
        config.device_name = lookup(env::DEVICE_NAME).filter(|v| !v.is_empty());
        config.device_profile = lookup(env::DEVICE_PROFILE).filter(|v| !v.is_empty());

        tracing::debug!(
            url = %config.base_url(),
            user = %config.username,
            password = %mask_password(&config.password),
            "Loaded configuration from environment"
        );

        Ok(config)
    }

    /// Sets the REST port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables HTTPS (and WSS for subscriptions).
    #[must_use]
    pub fn with_https(mut self) -> Self {
        self.use_https = true;
        self
    }

    /// Sets the MQTT port.
    #[must_use]
    pub fn with_mqtt_port(mut self, port: u16) -> Self {
        self.mqtt_port = port;
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the device an application acts for.
    #[must_use]
    pub fn with_device(mut self, name: impl Into<String>, profile: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self.device_profile = Some(profile.into());
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the REST port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether HTTPS is enabled.
    #[must_use]
    pub fn use_https(&self) -> bool {
        self.use_https
    }

    /// Returns the MQTT port.
    #[must_use]
    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    /// Returns the login user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the login password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the configured device name.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Returns the configured device profile, or the platform default.
    #[must_use]
    pub fn device_profile(&self) -> &str {
        self.device_profile
            .as_deref()
            .unwrap_or(DEFAULT_DEVICE_PROFILE_NAME)
    }

    /// Builds the REST base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        let port_suffix =
            if (self.use_https && self.port == 443) || (!self.use_https && self.port == 80) {
                String::new()
            } else {
                format!(":{}", self.port)
            };
        format!("{scheme}://{}{port_suffix}", self.host)
    }

    /// Builds the MQTT broker URL.
    #[must_use]
    pub fn mqtt_url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.mqtt_port)
    }
}

impl std::fmt::Debug for TbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TbConfig")
            .field("base_url", &self.base_url())
            .field("mqtt_port", &self.mqtt_port)
            .field("username", &self.username)
            .field("password", &mask_password(&self.password))
            .field("timeout", &self.timeout)
            .field("device_name", &self.device_name)
            .field("device_profile", &self.device_profile)
            .finish()
    }
}

/// Masks a password for logging, keeping only its first character.
///
/// ```
/// assert_eq!(tbkit::config::mask_password("tenant"), "t*****");
/// ```
#[must_use]
pub fn mask_password(password: &str) -> String {
    let mut chars = password.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.map(|_| '*'))
            .collect(),
        None => String::new(),
    }
}

/// Configuration for automatic reconnection.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tbkit::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_max_retries(5)
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(30));
/// assert!(policy.should_retry(4));
/// assert!(!policy.should_retry(5));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of retries before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Initial delay between retry attempts.
    pub initial_delay: Duration,
    /// Maximum delay between retry attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates a new reconnection policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled reconnection policy.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets infinite retries.
    #[must_use]
    pub fn with_infinite_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the initial delay between retry attempts.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retry attempts.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay for a given retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Returns true if another retry should be attempted.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    /// Five attempts one second apart, the way device clients retry a
    /// graceful disconnect before forcing it.
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = TbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url(), "http://thingsboard:9090");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.username(), TB_TENANT_USER);
        assert_eq!(config.password(), TB_TENANT_PW);
        assert_eq!(config.device_profile(), DEFAULT_DEVICE_PROFILE_NAME);
        assert!(config.device_name().is_none());
    }

    #[test]
    fn host_and_ports_from_environment() {
        let config = TbConfig::from_lookup(lookup(&[
            ("TB_HOST", "tb.local"),
            ("TB_REST_PORT", "8080"),
            ("TB_MQTT_PORT", "1884"),
            ("TB_USER", "admin@example.com"),
            ("TB_PW", "secret"),
            ("DEVICE_NAME", "press-1"),
            ("DEVICE_PROFILE", "press"),
        ]))
        .unwrap();

        assert_eq!(config.base_url(), "http://tb.local:8080");
        assert_eq!(config.mqtt_url(), "mqtt://tb.local:1884");
        assert_eq!(config.username(), "admin@example.com");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.device_name(), Some("press-1"));
        assert_eq!(config.device_profile(), "press");
    }

    #[test]
    fn url_takes_precedence() {
        let config = TbConfig::from_lookup(lookup(&[
            ("TB_URL", "https://cloud.example.com"),
            ("TB_HOST", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.host(), "cloud.example.com");
        assert_eq!(config.port(), 443);
        assert!(config.use_https());
        assert_eq!(config.base_url(), "https://cloud.example.com");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = TbConfig::from_lookup(lookup(&[("TB_REST_PORT", "http")]));
        assert!(matches!(
            result,
            Err(crate::Error::Config(ConfigError::InvalidEnv { .. }))
        ));
    }

    #[test]
    fn from_url_with_path_and_port() {
        let config = TbConfig::from_url("http://127.0.0.1:41234/").unwrap();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 41234);
        assert_eq!(config.base_url(), "http://127.0.0.1:41234");
    }

    #[test]
    fn from_url_rejects_empty_host() {
        assert!(TbConfig::from_url("http://").is_err());
    }

    #[test]
    fn from_url_with_ipv6_host() {
        let config = TbConfig::from_url("http://[::1]:9090").unwrap();
        assert_eq!(config.host(), "[::1]");
        assert_eq!(config.port(), 9090);
        assert_eq!(config.base_url(), "http://[::1]:9090");
        assert_eq!(config.mqtt_url(), "mqtt://[::1]:1883");
    }

    #[test]
    fn from_url_ignores_query() {
        let config = TbConfig::from_url("http://tb.local:8080/?tenant=plant").unwrap();
        assert_eq!(config.host(), "tb.local");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.base_url(), "http://tb.local:8080");
    }

    #[test]
    fn from_url_defaults() {
        let config = TbConfig::from_url("https://tb.example.com").unwrap();
        assert_eq!(config.port(), 443);
        assert_eq!(config.base_url(), "https://tb.example.com");

        let config = TbConfig::from_url("tb:9091").unwrap();
        assert_eq!(config.host(), "tb");
        assert_eq!(config.port(), 9091);

        assert!(TbConfig::from_url("ftp://tb").is_err());
    }

    #[test]
    fn password_is_masked() {
        assert_eq!(mask_password("sysadmin"), "s*******");
        assert_eq!(mask_password("x"), "x");
        assert_eq!(mask_password(""), "");

        let debug = format!("{:?}", TbConfig::new("h").with_credentials("u", "secret"));
        assert!(debug.contains("s*****"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn reconnection_policy_defaults() {
        let policy = ReconnectionPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_retries, Some(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(1));
    }

    #[test]
    fn reconnection_policy_backoff_is_capped() {
        let policy = ReconnectionPolicy::new()
            .with_backoff_multiplier(2.0)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let policy = ReconnectionPolicy::disabled();
        assert!(!policy.should_retry(0));

        let infinite = ReconnectionPolicy::new().with_infinite_retries();
        assert!(infinite.should_retry(u32::MAX - 1));
    }
}
