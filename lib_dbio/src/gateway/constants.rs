//! Wire-level constants for the realtime gateway.

use std::time::Duration;

/// Default gateway endpoint.
pub const GATEWAY_URL: &str = "wss://api.discord.bio/bio_ws";
/// Engine.IO protocol version sent in the handshake query string.
pub const ENGINE_IO_VERSION: &str = "3";
/// Transport kind sent in the handshake query string.
pub const TRANSPORT: &str = "websocket";

/// Close code that signals a clean, non-retried close.
pub const SUCCESS_CLOSE_CODE: u16 = 1000;
/// Close code assumed when the transport dies without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;
/// Reason text sent with client-initiated closes.
pub const CLOSE_REASON: &str = "WebSocket connection closed by client";

/// Packet-type prefix for outbound event frames (`42[...]`).
pub const OUTBOUND_MESSAGE_CODE: &str = "42";
/// The liveness probe frame (ping opcode `2` as a text frame).
pub const PING_FRAME: &str = "2";
/// The liveness reply the server answers probes with.
pub const PONG_FRAME: &str = "3";

/// Event announced right after connecting so the server starts streaming.
pub const VIEWING_PROFILE: &str = "VIEWING";

/// Period of the fleet-wide heartbeat cycle.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(25_000);

/// Placeholder substituted with the subscribed id in [`BANNER_URL`].
pub const BANNER_URL_PARAM: &str = ":uid";
/// Template for profile banner URLs.
pub const BANNER_URL: &str = "https://s3.eu-west-2.amazonaws.com/discord.bio/banners/:uid";

/// Server event names, upper-snake-case on the wire.
pub mod event_names {
    pub const PRESENCE: &str = "PRESENCE";
    pub const PROFILE_UPDATE: &str = "PROFILE_UPDATE";
    pub const TOTAL_VIEWING: &str = "TOTAL_VIEWING";
    pub const VIEWING: &str = "VIEWING";
    pub const BANNER_UPDATE: &str = "BANNER_UPDATE";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const METRICS: &str = "METRICS";
}
