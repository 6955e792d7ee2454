//! # Ratelimit Bucket
//!
//! Contract for client-side ratelimit accounting. The upstream API allows
//! [`REQUEST_LIMIT_PER_INTERVAL`] requests per [`RATELIMIT_INTERVAL`];
//! the accounting itself is not implemented upstream, so this type only
//! fixes the interface and the limits.

use std::time::Duration;

/// Requests allowed per ratelimit window.
pub const REQUEST_LIMIT_PER_INTERVAL: u32 = 100;
/// Length of the ratelimit window.
pub const RATELIMIT_INTERVAL: Duration = Duration::from_millis(60_000);

/// Client-side ratelimit accounting.
// TODO: queue and drain requests against REQUEST_LIMIT_PER_INTERVAL once
// the upstream contract is finalized.
#[derive(Debug, Default)]
pub struct Bucket;

impl Bucket {
    /// Whether a request may be issued right now. Always true until the
    /// accounting lands; callers should still consult it so the wiring is
    /// in place.
    pub fn try_acquire(&self) -> bool {
        true
    }
}
