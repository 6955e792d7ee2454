//! REST endpoint and header constants.

/// Default REST API base URL.
pub const BASE_URL: &str = "https://api.discord.bio";
/// API version path segment.
pub const VERSION: &str = "/v1";
/// Marker introducing a path parameter in an endpoint template.
pub const PARAM_INDICATOR: char = ':';

/// User details lookup by id or slug.
pub const DETAILS: &str = "/user/details/:input";
/// The top-liked users listing.
pub const TOP_LIKES: &str = "/topLikes";

/// Base URL for outbound webhook deliveries.
pub const WEBHOOK_BASE: &str = "https://discord.com/api/webhooks";

/// User-agent sent with every REST request.
pub const USER_AGENT: &str = concat!("lib_dbio/", env!("CARGO_PKG_VERSION"));

/// Ratelimit response header names.
pub mod headers {
    pub const RATELIMIT_RESET: &str = "x-ratelimit-reset";
    pub const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
    pub const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
}
