//! # Error Taxonomy
//!
//! Defines the error types produced by the gateway state machine, the fleet
//! manager and the REST client. Recoverable conditions (a timed-out liveness
//! probe, a ratelimited request) get their own variants so callers can match
//! on them instead of string-inspecting messages.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Snapshot of the `x-ratelimit-*` headers attached to a REST response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatelimitInfo {
    /// Maximum number of requests allowed per ratelimit window.
    pub limit: Option<u64>,
    /// Requests remaining in the current window.
    pub remaining: Option<u64>,
    /// Unix timestamp at which the window resets.
    pub reset: Option<u64>,
}

#[derive(Debug, Error)]
/// # Library Error
///
/// Every fallible operation in this crate returns this type.
pub enum DbioError {
    /// An operation was attempted in the wrong socket state (connect while
    /// open, close while closed, ping while a probe is outstanding). This
    /// signals a caller bug and is never retried automatically.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A frame could not be interpreted: non-text data, or invalid JSON
    /// after the packet-type prefix was stripped. Fatal for that message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error raised by the underlying WebSocket transport.
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// `unsubscribe` was called for an identifier with no active socket.
    #[error("no socket is subscribed to id {0}")]
    NotFound(String),

    /// A liveness probe or connection attempt was not answered within the
    /// configured window. Recoverable; the caller may retry.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The REST API answered with a non-2xx status.
    #[error("api error (status {status}): {message}")]
    Api {
        /// The HTTP status code of the failing response.
        status: u16,
        /// The error message extracted from the response body.
        message: String,
    },

    /// The REST API answered with 429 Too Many Requests.
    #[error("ratelimited: {message}")]
    Ratelimit {
        /// The error message extracted from the response body.
        message: String,
        /// The ratelimit headers carried by the 429 response.
        info: RatelimitInfo,
    },

    /// A network-level failure while talking to the REST API.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DbioError>;
