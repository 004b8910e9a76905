// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `tbkit` library.
//!
//! This module provides the error hierarchy used across the crate: protocol
//! communication (REST, MQTT, WebSocket), payload parsing, entity lookups and
//! local configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::entity::EntityType;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// An entity could not be resolved on the platform.
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    /// Local configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the platform rejected the request with a 4xx status.
    ///
    /// Removers treat such answers as "entity does not exist".
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_client_error())
    }

    /// Returns true if the platform answered with 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Protocol(ProtocolError::Status { status: 404, .. })
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(ParseError::Json(err))
    }
}

/// Errors related to protocol communication (REST/MQTT/WebSocket).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// MQTT connection or communication failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// WebSocket connection or communication failed.
    #[cfg(feature = "ws")]
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// The platform answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the platform.
        body: String,
    },

    /// Connection to the platform failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Authentication failed.
    #[error("authentication failed for user {0}")]
    AuthenticationFailed(String),

    /// The client has not logged in yet.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl ProtocolError {
    /// Returns true for 4xx status answers.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if (400..500).contains(status))
    }
}

#[cfg(feature = "ws")]
impl From<tokio_tungstenite::tungstenite::Error> for ProtocolError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Errors related to parsing platform payloads and local JSON files.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Unexpected payload format.
    #[error("unexpected format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// Errors related to platform entities.
#[derive(Debug, Error)]
pub enum EntityError {
    /// A referenced entity does not exist.
    #[error("{entity_type} '{name}' not found")]
    NotFound {
        /// Type of the missing entity.
        entity_type: EntityType,
        /// Name (or id) used for the lookup.
        name: String,
    },

    /// The entity carries no id although one is required.
    #[error("{0} has no id")]
    MissingId(EntityType),

    /// The operation is not available for this entity type.
    #[error("entity type {0} is not supported here")]
    Unsupported(EntityType),

    /// An argument combination is not valid for the operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors related to local configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The given path is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// A required file does not exist.
    #[error("file {0} does not exist")]
    MissingFile(PathBuf),

    /// An environment variable holds an invalid value.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
