//! # Profile Payloads
//!
//! The combined profile shape stored in the user-profile cache and carried
//! by `profileUpdate` events, plus the summary shape returned by the
//! top-likes endpoint.

use serde::{Deserialize, Serialize};

use super::{DiscordUser, UserDetails};

/// A full profile: site-side user data plus the linked Discord account.
///
/// The `discord` half is absent when a payload was assembled purely from a
/// gateway event for a profile that was never fetched over REST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub user: User,
    #[serde(default)]
    pub discord: Option<DiscordUser>,
}

/// The site-side half of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub details: UserDetails,
    #[serde(rename = "userConnections", default)]
    pub user_connections: UserConnections,
    #[serde(rename = "discordConnections", default)]
    pub discord_connections: Vec<DiscordConnection>,
}

/// External accounts linked on the profile page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConnections {
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub snapchat: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
}

/// A Discord-side connection (Spotify, Steam, ...) shown on the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordConnection {
    pub connection_type: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// One entry of the top-likes listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUser {
    pub discord: DiscordUser,
    pub user: TopUserSummary,
}

/// The reduced user shape the top-likes endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUserSummary {
    pub slug: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub description: Option<String>,
}
