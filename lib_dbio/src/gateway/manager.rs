//! # Socket Manager
//!
//! The fleet coordinator. Owns one [`Socket`] per subscribed identifier
//! (stored in a non-expiring [`Collection`]), runs the shared heartbeat
//! cycle, demultiplexes decoded gateway events, and merges profile and
//! presence data into the caches before republishing on the event bus.
//!
//! The heartbeat timer exists exactly while at least one socket is active:
//! subscribing the first identifier starts it, removing the last one stops
//! it. A probe failure on one socket is logged and skipped so a single
//! unreachable connection cannot stall the cycle for the rest of the fleet.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::constants::{event_names, BANNER_URL, BANNER_URL_PARAM, HEARTBEAT_INTERVAL};
use super::socket::{Socket, SocketOptions, SocketSignal, SocketState, WebhookOptions};
use crate::collection::{Collection, CollectionOptions};
use crate::errors::{DbioError, Result};
use crate::events::{ClientEvent, EventBus};
use crate::gateway::socket::ReconnectPolicy;
use crate::rest::RestClient;
use crate::structures::ProfilePayload;
use crate::util::snake_to_camel_case;

/// Fleet-wide defaults applied to every socket.
#[derive(Debug, Clone)]
pub struct SocketManagerOptions {
    /// Gateway endpoint handed to every socket.
    pub gateway_url: String,
    /// Default auto-reconnect setting.
    pub auto_reconnect: bool,
    /// Default connection timeout.
    pub connection_timeout: Duration,
    /// Default liveness-probe timeout.
    pub ping_timeout: Option<Duration>,
    /// Default reconnect backoff policy.
    pub reconnect: ReconnectPolicy,
    /// Period of the shared heartbeat cycle.
    pub heartbeat_interval: Duration,
}

impl Default for SocketManagerOptions {
    fn default() -> Self {
        let socket_defaults = SocketOptions::default();
        Self {
            gateway_url: socket_defaults.gateway_url,
            auto_reconnect: socket_defaults.auto_reconnect,
            connection_timeout: socket_defaults.connection_timeout,
            ping_timeout: socket_defaults.ping_timeout,
            reconnect: socket_defaults.reconnect,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

/// Per-subscription overrides.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Webhook to fire when this profile updates.
    pub webhook: Option<WebhookOptions>,
}

struct ManagerInner {
    options: SocketManagerOptions,
    sockets: Collection<String, Socket>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    signals: mpsc::UnboundedSender<SocketSignal>,
    bus: EventBus,
    user_profiles: Option<Collection<String, ProfilePayload>>,
    presences: Option<Collection<String, Value>>,
    rest: Option<Arc<RestClient>>,
}

/// Coordinator for the fleet of per-identifier gateway sockets.
pub struct SocketManager {
    inner: Arc<ManagerInner>,
}

impl SocketManager {
    /// Creates a manager and spawns its demultiplexer task. Must be called
    /// within a tokio runtime.
    pub fn new(
        options: SocketManagerOptions,
        bus: EventBus,
        user_profiles: Option<Collection<String, ProfilePayload>>,
        presences: Option<Collection<String, Value>>,
        rest: Option<Arc<RestClient>>,
    ) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            options,
            sockets: Collection::new(CollectionOptions::default()),
            heartbeat: Mutex::new(None),
            signals,
            bus,
            user_profiles,
            presences,
            rest,
        });
        tokio::spawn(Self::demux_loop(Arc::downgrade(&inner), signal_rx));
        Self { inner }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.inner.sockets.len()
    }

    /// True when nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.inner.sockets.is_empty()
    }

    /// The socket bound to `id`, if subscribed.
    pub fn socket(&self, id: &str) -> Option<Socket> {
        self.inner.sockets.get(&id.to_string())
    }

    /// Identifiers of every active subscription, in subscription order.
    pub fn subscribed_ids(&self) -> Vec<String> {
        self.inner.sockets.keys()
    }

    /// Whether the shared heartbeat timer is currently running.
    pub fn heartbeat_running(&self) -> bool {
        self.inner
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .is_some()
    }

    /// Subscribes to `id`: creates a socket, connects it, and starts the
    /// shared heartbeat when this is the first active subscription.
    ///
    /// Fails with `InvalidState` when a socket already exists for `id`.
    pub async fn subscribe(&self, id: &str, options: SubscribeOptions) -> Result<Socket> {
        let key = id.to_string();
        if self.inner.sockets.has(&key) {
            return Err(DbioError::InvalidState(
                "a socket is already subscribed to this id",
            ));
        }
        let socket_options = SocketOptions {
            gateway_url: self.inner.options.gateway_url.clone(),
            auto_reconnect: self.inner.options.auto_reconnect,
            connection_timeout: self.inner.options.connection_timeout,
            ping_timeout: self.inner.options.ping_timeout,
            reconnect: self.inner.options.reconnect.clone(),
            webhook: options.webhook,
        };
        let socket = Socket::new(id, socket_options, self.inner.signals.clone());
        self.inner.sockets.set(key.clone(), socket.clone());
        if let Err(e) = socket.connect().await {
            self.inner.sockets.delete(&key);
            self.stop_heartbeat_if_idle();
            return Err(e);
        }
        self.ensure_heartbeat();
        Ok(socket)
    }

    /// Closes and removes the socket for `id`; stops the heartbeat when
    /// this was the last subscription. Fails with `NotFound` when no
    /// socket exists for `id`.
    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let Some(socket) = self.inner.sockets.get(&key) else {
            return Err(DbioError::NotFound(key));
        };
        // A disconnected socket may still be inside its reconnect backoff;
        // abandoning it stops that loop from resurrecting the connection.
        socket.abandon();
        let result = if socket.state() == SocketState::Disconnected {
            Ok(())
        } else {
            socket.close().await
        };
        self.inner.sockets.delete(&key);
        self.stop_heartbeat_if_idle();
        result
    }

    /// Closes and removes every socket and stops the heartbeat.
    pub async fn unsubscribe_all(&self) {
        for key in self.inner.sockets.keys() {
            if let Some(socket) = self.inner.sockets.get(&key) {
                socket.abandon();
                if socket.state() != SocketState::Disconnected {
                    if let Err(e) = socket.close().await {
                        log::warn!("socket {key}: close during unsubscribe_all failed: {e}");
                    }
                }
            }
            self.inner.sockets.delete(&key);
        }
        self.stop_heartbeat_if_idle();
    }

    /// Probes every active socket concurrently and returns the individual
    /// round-trip times, or `None` when nothing is subscribed.
    pub async fn socket_pings(&self) -> Result<Option<Vec<Duration>>> {
        let sockets = self.inner.sockets.values();
        if sockets.is_empty() {
            return Ok(None);
        }
        let results =
            futures_util::future::join_all(sockets.iter().map(|socket| socket.ping())).await;
        let pings = results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Some(pings))
    }

    /// The arithmetic mean of every socket's round-trip time in
    /// milliseconds, or `None` when nothing is subscribed.
    pub async fn ping_avg(&self) -> Result<Option<f64>> {
        match self.socket_pings().await? {
            None => Ok(None),
            Some(pings) => {
                let total: f64 = pings.iter().map(|d| d.as_secs_f64() * 1_000.0).sum();
                Ok(Some(total / pings.len() as f64))
            }
        }
    }

    fn ensure_heartbeat(&self) {
        let mut heartbeat = self
            .inner
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned");
        if heartbeat.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.options.heartbeat_interval;
        *heartbeat = Some(tokio::spawn(Self::heartbeat_loop(weak, period)));
        log::debug!("heartbeat started");
    }

    fn stop_heartbeat_if_idle(&self) {
        if !self.inner.sockets.is_empty() {
            return;
        }
        if let Some(handle) = self
            .inner
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .take()
        {
            handle.abort();
            log::debug!("heartbeat stopped");
        }
    }

    /// The shared heartbeat cycle: probe every socket in turn, awaiting
    /// each, isolating per-socket failures.
    async fn heartbeat_loop(inner: Weak<ManagerInner>, period: Duration) {
        let start = tokio::time::Instant::now() + period;
        let mut tick = tokio::time::interval_at(start, period);
        loop {
            tick.tick().await;
            let Some(inner) = inner.upgrade() else { return };
            for key in inner.sockets.keys() {
                let Some(socket) = inner.sockets.get(&key) else {
                    continue;
                };
                match socket.ping().await {
                    Ok(rtt) => log::trace!("heartbeat: socket {key} answered in {rtt:?}"),
                    Err(e) => log::warn!("heartbeat: socket {key} probe failed: {e}"),
                }
            }
        }
    }

    async fn demux_loop(
        inner: Weak<ManagerInner>,
        mut signals: mpsc::UnboundedReceiver<SocketSignal>,
    ) {
        while let Some(signal) = signals.recv().await {
            let Some(inner) = inner.upgrade() else { return };
            inner.handle_signal(signal);
        }
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        if let Some(handle) = self
            .inner
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl ManagerInner {
    fn handle_signal(self: &Arc<Self>, signal: SocketSignal) {
        match signal {
            SocketSignal::Open { id } => {
                self.bus.publish(ClientEvent::Open { id });
            }
            SocketSignal::Close { id, code, reason } => {
                self.bus.publish(ClientEvent::Close { id, code, reason });
            }
            SocketSignal::Error { id, error } => {
                // Already logged at the socket; republish for listeners.
                self.bus.publish(ClientEvent::Error {
                    id,
                    message: error.to_string(),
                });
            }
            SocketSignal::ReconnectFailed { id } => {
                self.bus.publish(ClientEvent::ReconnectFailed { id });
            }
            SocketSignal::Event { id, name, data } => self.dispatch_event(id, name, data),
        }
    }

    /// Routes one decoded gateway event: known kinds are normalized to
    /// camelCase and republished with the originating id (plus their cache
    /// side effects); everything else passes through as `unknown`.
    fn dispatch_event(self: &Arc<Self>, id: String, name: String, data: Value) {
        log::debug!(
            "socket {id}: {} event",
            snake_to_camel_case(&name.to_lowercase())
        );
        match name.as_str() {
            event_names::PROFILE_UPDATE => self.on_profile_update(id, data),
            event_names::BANNER_UPDATE => self.on_banner_update(id, data),
            event_names::PRESENCE => self.on_presence(id, data),
            event_names::TOTAL_VIEWING => {
                let count = data.as_u64().unwrap_or_default();
                self.bus.publish(ClientEvent::TotalViewing { id, count });
            }
            event_names::METRICS => {
                self.bus.publish(ClientEvent::Metrics { id, data });
            }
            _ => {
                self.bus.publish(ClientEvent::Unknown {
                    id,
                    event: name,
                    data,
                });
            }
        }
    }

    fn on_profile_update(self: &Arc<Self>, id: String, data: Value) {
        let new_profile: ProfilePayload = match serde_json::from_value(data) {
            Ok(profile) => profile,
            Err(e) => {
                let error = DbioError::Protocol(format!("malformed PROFILE_UPDATE payload: {e}"));
                log::error!("socket {id}: {error}");
                self.bus.publish(ClientEvent::Error {
                    id,
                    message: error.to_string(),
                });
                return;
            }
        };
        let old_profile = self
            .user_profiles
            .as_ref()
            .and_then(|cache| cache.get(&id));
        self.bus.publish(ClientEvent::ProfileUpdate {
            id: id.clone(),
            old_profile,
            new_profile: new_profile.clone(),
        });

        if let (Some(rest), Some(socket)) = (self.rest.as_ref(), self.sockets.get(&id)) {
            if let Some(hook) = socket.webhook_options() {
                let rest = Arc::clone(rest);
                let id = id.clone();
                tokio::spawn(async move {
                    let payload = serde_json::json!({
                        "content": format!("Profile {id} was updated"),
                    });
                    if let Err(e) = rest.execute_webhook(&hook.id, &hook.token, &payload).await {
                        log::warn!("webhook for {id} failed: {e}");
                    }
                });
            }
        }

        if let Some(cache) = &self.user_profiles {
            match cache.get(&id) {
                // Keep the previously linked Discord account; the gateway
                // payload only refreshes the site-side user data.
                Some(mut cached) => {
                    cached.user = new_profile.user;
                    cache.set(id, cached);
                }
                None => cache.set(
                    id,
                    ProfilePayload {
                        user: new_profile.user,
                        discord: None,
                    },
                ),
            }
        }
    }

    fn on_banner_update(&self, id: String, data: Value) {
        let has_banner = data.as_bool().unwrap_or(false);
        let url = has_banner.then(|| BANNER_URL.replace(BANNER_URL_PARAM, &id));
        self.bus.publish(ClientEvent::BannerUpdate {
            id: id.clone(),
            url: url.clone(),
        });
        if let Some(cache) = &self.user_profiles {
            if let Some(mut cached) = cache.get(&id) {
                cached.user.details.banner = url;
                cache.set(id, cached);
            }
        }
    }

    fn on_presence(&self, id: String, data: Value) {
        self.bus.publish(ClientEvent::Presence {
            id: id.clone(),
            data: data.clone(),
        });
        if let Some(cache) = &self.presences {
            cache.set(id, data);
        }
    }
}
