//! # Client Events & Event Bus
//!
//! The unified event stream the library exposes. Gateway frames from every
//! subscribed socket are demultiplexed by the fleet manager and republished
//! here as [`ClientEvent`]s; every event carries the identifier of the
//! socket it originated from.
//!
//! The bus is a value the client and manager hold and delegate to, not a
//! base class: subscribers register and receive an unbounded channel, and
//! `publish` fans an event out to every live subscriber, pruning the ones
//! whose receiver has been dropped.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::structures::ProfilePayload;

/// An event republished on the client's unified stream.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// `profileUpdate`: the subscribed profile changed. Carries the
    /// previously cached profile (if any) so consumers can diff.
    ProfileUpdate {
        id: String,
        old_profile: Option<ProfilePayload>,
        new_profile: ProfilePayload,
    },
    /// `bannerUpdate`: the profile banner was set (`url` is the resolved
    /// banner URL) or removed (`url` is `None`).
    BannerUpdate { id: String, url: Option<String> },
    /// `presence`: the raw presence payload for the subscribed user.
    Presence { id: String, data: Value },
    /// `totalViewing`: how many clients are viewing the profile.
    TotalViewing { id: String, count: u64 },
    /// `metrics`: server-side metrics for the subscription.
    Metrics { id: String, data: Value },
    /// `unknown`: an event kind this library does not special-case,
    /// forwarded verbatim with its wire name.
    Unknown { id: String, event: String, data: Value },
    /// A socket finished connecting and announced its subscription.
    Open { id: String },
    /// A socket closed, with the transport close code and reason.
    Close { id: String, code: u16, reason: String },
    /// A transport or protocol error on one socket. Also logged at error
    /// level so an unobserved bus never hides failures.
    Error { id: String, message: String },
    /// Auto-reconnect gave up after exhausting its retry budget. Terminal
    /// for that socket until the caller resubscribes.
    ReconnectFailed { id: String },
}

impl ClientEvent {
    /// The camelCase emit name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::ProfileUpdate { .. } => "profileUpdate",
            ClientEvent::BannerUpdate { .. } => "bannerUpdate",
            ClientEvent::Presence { .. } => "presence",
            ClientEvent::TotalViewing { .. } => "totalViewing",
            ClientEvent::Metrics { .. } => "metrics",
            ClientEvent::Unknown { .. } => "unknown",
            ClientEvent::Open { .. } => "open",
            ClientEvent::Close { .. } => "close",
            ClientEvent::Error { .. } => "error",
            ClientEvent::ReconnectFailed { .. } => "reconnectFailed",
        }
    }

    /// The identifier of the socket this event originated from.
    pub fn id(&self) -> &str {
        match self {
            ClientEvent::ProfileUpdate { id, .. }
            | ClientEvent::BannerUpdate { id, .. }
            | ClientEvent::Presence { id, .. }
            | ClientEvent::TotalViewing { id, .. }
            | ClientEvent::Metrics { id, .. }
            | ClientEvent::Unknown { id, .. }
            | ClientEvent::Open { id }
            | ClientEvent::Close { id, .. }
            | ClientEvent::Error { id, .. }
            | ClientEvent::ReconnectFailed { id } => id,
        }
    }
}

struct Subscriber {
    sender: mpsc::UnboundedSender<ClientEvent>,
}

/// Fan-out publish/subscribe bus for [`ClientEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiving half. The
    /// channel is unbounded; a subscriber that stops draining it only
    /// grows its own queue.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.push(Subscriber { sender: tx });
        rx
    }

    /// Publishes `event` to every live subscriber and returns how many
    /// received it. Subscribers whose receiver was dropped are removed.
    pub fn publish(&self, event: ClientEvent) -> usize {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.retain(|sub| sub.sender.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("event bus lock poisoned").len()
    }
}
