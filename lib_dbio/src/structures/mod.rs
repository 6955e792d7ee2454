//! # Data Structures
//!
//! Typed shapes for the payloads the REST API and the gateway both deliver:
//! user details, the linked Discord account, and the combined profile
//! payload that the profile cache stores.

/// The linked Discord account attached to a profile.
pub mod discord_user;
/// The combined profile payload and its connection sub-objects.
pub mod profile;
/// Site-level user details with packed account flags.
pub mod user_details;

pub use discord_user::DiscordUser;
pub use profile::{DiscordConnection, ProfilePayload, TopUser, TopUserSummary, User, UserConnections};
pub use user_details::{UserDetails, FLAG_PREMIUM, FLAG_STAFF, FLAG_VERIFIED};
