//! # lib_dbio
//!
//! Client library for the discord.bio profile service: realtime profile
//! subscriptions over its WebSocket gateway plus a REST client for
//! one-shot lookups, sharing a bounded, expiring cache layer.
//!
//! The [`Client`] facade is the usual entry point; the gateway fleet
//! ([`gateway::SocketManager`]), the REST client ([`rest::RestClient`])
//! and the cache ([`collection::Collection`]) are usable on their own.

// Declare the modules to re-export
pub mod client;
pub mod collection;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod rest;
pub mod structures;
pub mod util;

// Re-export the primary surface
pub use client::{Client, ClientOptions};
pub use collection::{Collection, CollectionOptions};
pub use errors::{DbioError, RatelimitInfo, Result};
pub use events::{ClientEvent, EventBus};
pub use gateway::{
    ReconnectPolicy, Socket, SocketManager, SocketManagerOptions, SocketOptions, SocketState,
    SubscribeOptions, WebhookOptions,
};
pub use rest::{RestClient, RestOptions};
pub use structures::{DiscordUser, ProfilePayload, TopUser, UserDetails};
