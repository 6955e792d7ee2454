//! # User Details
//!
//! Site-level details of a profile as sent by both the REST API and the
//! gateway's `PROFILE_UPDATE` payload. The verified/premium/staff booleans
//! can also be read as a packed bitfield via [`UserDetails::flags`].

use serde::{Deserialize, Serialize};

/// Bit set when the account is verified.
pub const FLAG_VERIFIED: u8 = 1 << 0;
/// Bit set when the account has premium.
pub const FLAG_PREMIUM: u8 = 1 << 1;
/// Bit set when the account belongs to site staff.
pub const FLAG_STAFF: u8 = 1 << 2;

/// Details of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetails {
    /// The profile's URL slug.
    pub slug: String,
    /// The numeric user id, kept as a string (ids exceed 2^53).
    pub user_id: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub staff: bool,
    /// ISO-8601 creation timestamp, when known.
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub gender: Option<i64>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    /// URL of the profile banner, patched live by `BANNER_UPDATE` events.
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub likes: i64,
}

impl UserDetails {
    /// The user id. Alias for `user_id`.
    pub fn id(&self) -> &str {
        &self.user_id
    }

    /// The account flags packed into a bitfield
    /// ([`FLAG_VERIFIED`] | [`FLAG_PREMIUM`] | [`FLAG_STAFF`]).
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.verified {
            flags |= FLAG_VERIFIED;
        }
        if self.premium {
            flags |= FLAG_PREMIUM;
        }
        if self.staff {
            flags |= FLAG_STAFF;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pack_the_three_account_bits() {
        let details: UserDetails = serde_json::from_value(serde_json::json!({
            "slug": "ferris",
            "user_id": "233667448887312385",
            "verified": true,
            "staff": true,
            "likes": 12
        }))
        .unwrap();
        assert_eq!(details.flags(), FLAG_VERIFIED | FLAG_STAFF);
        assert!(!details.premium);
        assert_eq!(details.id(), "233667448887312385");
    }

    #[test]
    fn optional_fields_default_to_none() {
        let details: UserDetails = serde_json::from_value(serde_json::json!({
            "slug": "minimal",
            "user_id": "1"
        }))
        .unwrap();
        assert_eq!(details.banner, None);
        assert_eq!(details.likes, 0);
        assert_eq!(details.flags(), 0);
    }
}
