//! # REST Module
//!
//! The request/response half of the library: profile lookups, the
//! top-likes listing and webhook delivery, with ratelimit header tracking.

/// Client-side ratelimit accounting.
pub mod bucket;
/// The REST client itself.
pub mod client;
/// Endpoint and header constants.
pub mod routes;

// --- Public API Re-exports ---
pub use bucket::Bucket;
pub use client::{RestClient, RestOptions};
