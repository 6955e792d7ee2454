//! # Discord User
//!
//! The Discord account linked to a profile. Avatar hashes prefixed with
//! `a_` denote animated avatars and resolve to `.gif` CDN URLs.

use serde::{Deserialize, Serialize};

const CDN_AVATAR_BASE: &str = "https://cdn.discordapp.com/avatars";

/// A Discord user attached to a profile payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordUser {
    /// The snowflake id, kept as a string (ids exceed 2^53).
    pub id: String,
    pub username: String,
    pub discriminator: String,
    #[serde(default)]
    pub public_flags: u64,
    /// The raw avatar hash, `a_`-prefixed when animated.
    #[serde(default)]
    pub avatar: Option<String>,
}

impl DiscordUser {
    /// The `username#discriminator` tag.
    pub fn tag(&self) -> String {
        format!("{}#{}", self.username, self.discriminator)
    }

    /// Whether the avatar hash denotes an animated avatar.
    pub fn avatar_animated(&self) -> bool {
        self.avatar
            .as_deref()
            .is_some_and(|hash| hash.starts_with("a_"))
    }

    /// The full CDN URL of the avatar, if one is set.
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar.as_deref().map(|hash| {
            let ext = if hash.starts_with("a_") { "gif" } else { "png" };
            format!("{}/{}/{}.{}", CDN_AVATAR_BASE, self.id, hash, ext)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(avatar: Option<&str>) -> DiscordUser {
        DiscordUser {
            id: "708680386980479036".into(),
            username: "ferris".into(),
            discriminator: "0042".into(),
            public_flags: 0,
            avatar: avatar.map(str::to_string),
        }
    }

    #[test]
    fn tag_joins_name_and_discriminator() {
        assert_eq!(user(None).tag(), "ferris#0042");
    }

    #[test]
    fn static_avatars_resolve_to_png() {
        let u = user(Some("797bcff8a356d210123bc606801ab4db"));
        assert!(!u.avatar_animated());
        assert_eq!(
            u.avatar_url().unwrap(),
            "https://cdn.discordapp.com/avatars/708680386980479036/797bcff8a356d210123bc606801ab4db.png"
        );
    }

    #[test]
    fn animated_avatars_resolve_to_gif() {
        let u = user(Some("a_deadbeef"));
        assert!(u.avatar_animated());
        assert!(u.avatar_url().unwrap().ends_with("a_deadbeef.gif"));
    }

    #[test]
    fn missing_avatar_has_no_url() {
        assert_eq!(user(None).avatar_url(), None);
    }
}
