// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebSocket client for the telemetry plugin.
//!
//! One socket carries every subscription of a [`WsClient`]. Frames are routed
//! to the [`Subscription`] whose `cmdId` matches the frame's
//! `subscriptionId`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

use super::command::SubscriptionCommand;
use super::parser::parse_frame;
use crate::config::ReconnectionPolicy;
use crate::entity::SubscriptionType;
use crate::error::{ProtocolError, Result};
use crate::rest::RestClient;
use crate::subscription::{AttrUpdate, CallbackRegistry, Subscribable};

/// Default timeout for opening the socket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the telemetry plugin endpoint.
const TELEMETRY_WS_PATH: &str = "/api/ws/plugins/telemetry";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Derives the socket URL from a REST base URL and a JWT.
///
/// `http` maps to `ws`, `https` to `wss`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidAddress`] if `base_url` is not a URL.
pub fn ws_url(base_url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ProtocolError::InvalidAddress(format!("{base_url}: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| ProtocolError::InvalidAddress(base_url.to_string()))?;
    url.set_path(TELEMETRY_WS_PATH);
    url.query_pairs_mut().clear().append_pair("token", token);

    Ok(url.into())
}

struct SubscriptionState {
    command: SubscriptionCommand,
    callbacks: CallbackRegistry,
}

/// Frames queued for the writer.
#[derive(Debug)]
enum Outgoing {
    Subscribe { cmd_id: i32, text: String },
    Text(String),
    Close,
}

impl Outgoing {
    /// Returns false for a subscribe command a replay has already sent.
    fn is_pending(&self, replayed: &HashSet<i32>) -> bool {
        match self {
            Self::Subscribe { cmd_id, .. } => !replayed.contains(cmd_id),
            Self::Text(_) | Self::Close => true,
        }
    }
}

struct Inner {
    rest: RestClient,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    subscriptions: RwLock<HashMap<i32, Arc<SubscriptionState>>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl Inner {
    /// Refreshes the session before building a reconnect URL.
    async fn fresh_url(&self) -> Result<String> {
        if let Err(e) = self.rest.refresh_session().await {
            tracing::warn!(error = %e, "Token refresh failed, reusing current token");
        }
        self.current_url()
    }

    fn current_url(&self) -> Result<String> {
        let token = self.rest.token().ok_or(ProtocolError::NotAuthenticated)?;
        ws_url(self.rest.base_url(), &token)
    }

    fn dispatch(&self, text: &str) {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unparsable WebSocket frame");
                return;
            }
        };

        let Some(id) = frame.subscription_id else {
            tracing::debug!("Ignoring frame without subscription id");
            return;
        };

        let state = self.subscriptions.read().get(&id).cloned();
        let Some(state) = state else {
            tracing::debug!(cmd_id = id, "Ignoring frame of unknown subscription");
            return;
        };

        if frame.is_error() {
            let message = frame.error_msg.as_deref().unwrap_or_default();
            tracing::warn!(cmd_id = id, code = frame.error_code, message = %message, "Subscription error");
            state.callbacks.dispatch_error(frame.error_code, message);
        } else {
            tracing::debug!(cmd_id = id, updates = frame.updates.len(), "Dispatching updates");
            state.callbacks.dispatch_updates(&frame.updates);
        }
    }

    fn active_commands(&self) -> Vec<SubscriptionCommand> {
        self.subscriptions
            .read()
            .values()
            .map(|state| state.command.clone())
            .collect()
    }
}

/// Client of the telemetry WebSocket.
///
/// Cheap to clone; all clones share the socket.
///
/// # Examples
///
/// ```no_run
/// use tbkit::{RestClient, TbConfig};
/// use tbkit::entity::SubscriptionType;
/// use tbkit::ws::WsClient;
///
/// # async fn example(device: uuid::Uuid) -> tbkit::Result<()> {
/// let rest = RestClient::connect(&TbConfig::new("localhost")).await?;
/// let ws = WsClient::connect(&rest).await?;
///
/// ws.subscribe_with(device, SubscriptionType::LatestTelemetry, &["foo"], |updates| {
///     for update in updates {
///         println!("{update}");
///     }
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

impl WsClient {
    /// Opens the socket with the session of `rest` and the default
    /// reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotAuthenticated`] if `rest` has not logged
    /// in, or the connection error.
    pub async fn connect(rest: &RestClient) -> Result<Self> {
        Self::connect_with_policy(rest, ReconnectionPolicy::default()).await
    }

    /// Opens the socket with a custom reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotAuthenticated`] if `rest` has not logged
    /// in, or the connection error.
    pub async fn connect_with_policy(rest: &RestClient, policy: ReconnectionPolicy) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            rest: rest.clone(),
            outgoing: tx,
            subscriptions: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let stream = open(&inner.current_url()?).await?;
        inner.connected.store(true, Ordering::SeqCst);
        tracing::info!(base_url = %rest.base_url(), "WebSocket connected");

        tokio::spawn(run(Arc::clone(&inner), stream, rx, policy));

        Ok(Self { inner })
    }

    /// Subscribes to updates of a device.
    ///
    /// An empty `keys` slice subscribes to every key. Listeners registered on
    /// the returned handle may miss the first frame; use
    /// [`subscribe_with`](Self::subscribe_with) to attach a handler first.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is closed.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        device_id: Uuid,
        kind: SubscriptionType,
        keys: &[S],
    ) -> Result<Subscription> {
        self.register(SubscriptionCommand::new(device_id, kind, keys), |_| {})
    }

    /// Subscribes to updates of a device and attaches a batch handler before
    /// the command is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is closed.
    pub fn subscribe_with<S, F>(
        &self,
        device_id: Uuid,
        kind: SubscriptionType,
        keys: &[S],
        handler: F,
    ) -> Result<Subscription>
    where
        S: AsRef<str>,
        F: Fn(&[AttrUpdate]) + Send + Sync + 'static,
    {
        self.register(SubscriptionCommand::new(device_id, kind, keys), |callbacks| {
            callbacks.on_updates(handler);
        })
    }

    fn register(
        &self,
        command: SubscriptionCommand,
        setup: impl FnOnce(&CallbackRegistry),
    ) -> Result<Subscription> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::ChannelClosed("WebSocket client is closed".into()).into());
        }

        let callbacks = CallbackRegistry::new();
        setup(&callbacks);
        let state = Arc::new(SubscriptionState { command, callbacks });
        let cmd_id = state.command.cmd_id;
        let payload = state.command.to_json()?;

        self.inner
            .subscriptions
            .write()
            .insert(cmd_id, Arc::clone(&state));
        tracing::debug!(
            cmd_id,
            device_id = %state.command.entity_id,
            kind = %state.command.scope,
            "Subscribing"
        );

        if let Err(e) = self.send(Outgoing::Subscribe {
            cmd_id,
            text: payload,
        }) {
            self.inner.subscriptions.write().remove(&cmd_id);
            return Err(e);
        }

        Ok(Subscription {
            state,
            client: self.clone(),
        })
    }

    /// Cancels a subscription. Returns `false` if it was not active.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is closed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<bool> {
        let cmd_id = subscription.cmd_id();
        if self.inner.subscriptions.write().remove(&cmd_id).is_none() {
            return Ok(false);
        }

        subscription.state.callbacks.clear();
        tracing::debug!(cmd_id, "Unsubscribing");
        self.send(Outgoing::Text(
            subscription.state.command.to_unsubscribe().to_json()?,
        ))?;
        Ok(true)
    }

    /// Closes the socket and drops every subscription.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.subscriptions.write().clear();
        // the run loop may already be gone
        let _ = self.inner.outgoing.send(Outgoing::Close);
        tracing::info!("WebSocket closed");
    }

    /// Returns true while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    fn send(&self, message: Outgoing) -> Result<()> {
        self.inner
            .outgoing
            .send(message)
            .map_err(|_| ProtocolError::ChannelClosed("WebSocket writer stopped".into()).into())
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("base_url", &self.inner.rest.base_url())
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Handle of one active subscription.
pub struct Subscription {
    state: Arc<SubscriptionState>,
    client: WsClient,
}

impl Subscription {
    /// Returns the `cmdId` frames of this subscription carry.
    #[must_use]
    pub fn cmd_id(&self) -> i32 {
        self.state.command.cmd_id
    }

    #[must_use]
    pub fn device_id(&self) -> Uuid {
        self.state.command.entity_id
    }

    #[must_use]
    pub fn kind(&self) -> SubscriptionType {
        self.state.command.scope
    }

    /// Returns the subscribed keys, `None` for all keys.
    #[must_use]
    pub fn keys(&self) -> Option<&str> {
        self.state.command.keys.as_deref()
    }

    /// Returns the client this subscription belongs to.
    #[must_use]
    pub fn client(&self) -> &WsClient {
        &self.client
    }

    /// Cancels this subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the client is closed.
    pub fn cancel(&self) -> Result<bool> {
        self.client.unsubscribe(self)
    }
}

impl Subscribable for Subscription {
    fn callbacks(&self) -> &CallbackRegistry {
        &self.state.callbacks
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cmd_id", &self.cmd_id())
            .field("device_id", &self.device_id())
            .field("kind", &self.kind())
            .field("callbacks", &self.state.callbacks)
            .finish()
    }
}

// =============================================================================
// Connection task
// =============================================================================

async fn open(url: &str) -> Result<WsStream> {
    let (stream, _) = tokio::time::timeout(DEFAULT_CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| {
            ProtocolError::Timeout(u64::try_from(DEFAULT_CONNECT_TIMEOUT.as_millis()).unwrap_or(u64::MAX))
        })?
        .map_err(ProtocolError::from)?;
    Ok(stream)
}

enum Ended {
    Closed,
    Lost,
}

async fn run(
    inner: Arc<Inner>,
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    policy: ReconnectionPolicy,
) {
    let (mut sink, mut source) = stream.split();
    let mut replayed = HashSet::new();

    loop {
        let ended = pump(&inner, &mut sink, &mut source, &mut outgoing, &replayed).await;
        inner.connected.store(false, Ordering::SeqCst);

        if matches!(ended, Ended::Closed) || inner.closed.load(Ordering::SeqCst) {
            break;
        }

        tracing::warn!("WebSocket connection lost");
        match reconnect(&inner, &policy).await {
            Some((stream, cmd_ids)) => {
                (sink, source) = stream.split();
                replayed = cmd_ids;
            }
            None => {
                tracing::warn!("Giving up on WebSocket reconnection");
                break;
            }
        }
    }

    tracing::debug!("WebSocket task stopped");
}

async fn pump(
    inner: &Inner,
    sink: &mut WsSink,
    source: &mut WsSource,
    outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    replayed: &HashSet<i32>,
) -> Ended {
    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.dispatch(&text),
                Some(Ok(Message::Close(_))) | None => return Ended::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket read failed");
                    return Ended::Lost;
                }
            },
            message = outgoing.recv() => match message {
                Some(Outgoing::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ended::Closed;
                }
                Some(message) if !message.is_pending(replayed) => {
                    tracing::debug!(?message, "Skipping command sent by the replay");
                }
                Some(Outgoing::Subscribe { text, .. } | Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "WebSocket write failed");
                        return Ended::Lost;
                    }
                }
                None => return Ended::Closed,
            },
        }
    }
}

async fn reconnect(inner: &Inner, policy: &ReconnectionPolicy) -> Option<(WsStream, HashSet<i32>)> {
    let mut attempt = 0;

    while policy.should_retry(attempt) {
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
        if inner.closed.load(Ordering::SeqCst) {
            return None;
        }

        tracing::info!(attempt = attempt + 1, "Reconnecting WebSocket");
        match resubscribe(inner).await {
            Ok(restored) => {
                inner.connected.store(true, Ordering::SeqCst);
                return Some(restored);
            }
            Err(e) => tracing::warn!(attempt = attempt + 1, error = %e, "Reconnection failed"),
        }
        attempt += 1;
    }

    None
}

/// Opens a fresh socket and replays every active subscription command.
///
/// Returns the socket and the `cmdId`s it replayed.
async fn resubscribe(inner: &Inner) -> Result<(WsStream, HashSet<i32>)> {
    let mut stream = open(&inner.fresh_url().await?).await?;

    let commands = inner.active_commands();
    for command in &commands {
        stream
            .send(Message::Text(command.to_json()?))
            .await
            .map_err(ProtocolError::from)?;
    }
    tracing::debug!(subscriptions = commands.len(), "Subscriptions restored");

    Ok((stream, commands.iter().map(|c| c.cmd_id).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_http_base() {
        assert_eq!(
            ws_url("http://localhost:9090", "abc").unwrap(),
            "ws://localhost:9090/api/ws/plugins/telemetry?token=abc"
        );
    }

    #[test]
    fn ws_url_from_https_base() {
        assert_eq!(
            ws_url("https://tb.example.com", "a.b.c").unwrap(),
            "wss://tb.example.com/api/ws/plugins/telemetry?token=a.b.c"
        );
    }

    #[test]
    fn ws_url_rejects_garbage() {
        assert!(ws_url("not a url", "t").is_err());
    }

    #[test]
    fn replayed_subscribes_are_not_sent_twice() {
        let replayed: HashSet<i32> = [3, 4].into_iter().collect();
        let subscribe = |cmd_id| Outgoing::Subscribe {
            cmd_id,
            text: String::new(),
        };

        assert!(!subscribe(3).is_pending(&replayed));
        assert!(subscribe(5).is_pending(&replayed));
        assert!(Outgoing::Text("unsubscribe 3".into()).is_pending(&replayed));
        assert!(Outgoing::Close.is_pending(&replayed));
        assert!(subscribe(3).is_pending(&HashSet::new()));
    }
}
