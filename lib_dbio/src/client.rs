//! # Client Facade
//!
//! The top-level entry point. Wires together the event bus, the optional
//! REST client, the optional profile/presence caches and the gateway
//! socket fleet, and re-exposes their operations behind one handle.

use std::sync::Arc;

use serde_json::Value;
use std::time::Duration;

use crate::collection::{Collection, CollectionOptions};
use crate::errors::Result;
use crate::events::{ClientEvent, EventBus};
use crate::gateway::{SocketManager, SocketManagerOptions, SubscribeOptions, WebhookOptions};
use crate::rest::{RestClient, RestOptions};
use crate::structures::{ProfilePayload, TopUser};

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to construct the REST client half.
    pub rest: bool,
    /// Whether to keep profile and presence caches.
    pub cache: bool,
    /// REST API base URL.
    pub api_url: String,
    /// Base URL webhook notifications are delivered to.
    pub webhook_url: String,
    /// Gateway fleet defaults.
    pub gateway: SocketManagerOptions,
    /// Expiry/bound settings for the profile cache.
    pub user_profiles: CollectionOptions,
    /// Expiry/bound settings for the presence cache.
    pub presences: CollectionOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            rest: true,
            cache: true,
            api_url: crate::rest::routes::BASE_URL.to_string(),
            webhook_url: crate::rest::routes::WEBHOOK_BASE.to_string(),
            gateway: SocketManagerOptions::default(),
            user_profiles: CollectionOptions::default(),
            presences: CollectionOptions::default(),
        }
    }
}

/// The library's main handle.
///
/// Dropping the client tears the fleet's background tasks down; sockets
/// that are still open are closed by the runtime when their tasks end.
pub struct Client {
    bus: EventBus,
    rest: Option<Arc<RestClient>>,
    user_profiles: Option<Collection<String, ProfilePayload>>,
    presences: Option<Collection<String, Value>>,
    gateway: SocketManager,
}

impl Client {
    /// Builds a client. Must be called within a tokio runtime; the gateway
    /// manager spawns its demultiplexer task immediately.
    pub fn new(options: ClientOptions) -> Self {
        let bus = EventBus::new();
        let (user_profiles, presences) = if options.cache {
            (
                Some(Collection::new(options.user_profiles.clone())),
                Some(Collection::new(options.presences.clone())),
            )
        } else {
            (None, None)
        };
        let rest = options.rest.then(|| {
            Arc::new(RestClient::new(
                RestOptions {
                    base_url: options.api_url.clone(),
                    webhook_base: options.webhook_url.clone(),
                },
                user_profiles.clone(),
            ))
        });
        let gateway = SocketManager::new(
            options.gateway,
            bus.clone(),
            user_profiles.clone(),
            presences.clone(),
            rest.clone(),
        );
        Self {
            bus,
            rest,
            user_profiles,
            presences,
            gateway,
        }
    }

    /// Opens a new event stream. Every published [`ClientEvent`] is
    /// delivered to every open stream.
    pub fn events(&self) -> tokio::sync::mpsc::UnboundedReceiver<ClientEvent> {
        self.bus.subscribe()
    }

    /// Subscribes to realtime updates for `id`.
    pub async fn subscribe(&self, id: &str) -> Result<()> {
        self.gateway
            .subscribe(id, SubscribeOptions::default())
            .await?;
        Ok(())
    }

    /// Subscribes to realtime updates for `id`, firing `webhook` whenever
    /// the profile updates.
    pub async fn subscribe_with(&self, id: &str, webhook: WebhookOptions) -> Result<()> {
        self.gateway
            .subscribe(
                id,
                SubscribeOptions {
                    webhook: Some(webhook),
                },
            )
            .await?;
        Ok(())
    }

    /// Ends the subscription for `id`.
    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.gateway.unsubscribe(id).await
    }

    /// Ends every subscription.
    pub async fn unsubscribe_all(&self) {
        self.gateway.unsubscribe_all().await;
    }

    /// Mean gateway round-trip time in milliseconds across the fleet, or
    /// `None` when nothing is subscribed.
    pub async fn ping_avg(&self) -> Result<Option<f64>> {
        self.gateway.ping_avg().await
    }

    /// Per-socket gateway round-trip times, or `None` when nothing is
    /// subscribed.
    pub async fn socket_pings(&self) -> Result<Option<Vec<Duration>>> {
        self.gateway.socket_pings().await
    }

    /// Fetches a profile by user id or slug over REST, cache-first.
    ///
    /// Fails with `InvalidState` when the client was built without the
    /// REST half.
    pub async fn fetch_user_details(&self, query: &str) -> Result<ProfilePayload> {
        self.rest()?.fetch_user_details(query).await
    }

    /// Fetches the top-liked users listing over REST.
    pub async fn fetch_top_users(&self) -> Result<Vec<TopUser>> {
        self.rest()?.fetch_top_users().await
    }

    /// The gateway fleet coordinator.
    pub fn gateway(&self) -> &SocketManager {
        &self.gateway
    }

    /// The profile cache, when caching is enabled.
    pub fn user_profiles(&self) -> Option<&Collection<String, ProfilePayload>> {
        self.user_profiles.as_ref()
    }

    /// The presence cache, when caching is enabled.
    pub fn presences(&self) -> Option<&Collection<String, Value>> {
        self.presences.as_ref()
    }

    fn rest(&self) -> Result<&Arc<RestClient>> {
        self.rest
            .as_ref()
            .ok_or(crate::errors::DbioError::InvalidState(
                "client was built without the REST half",
            ))
    }
}
