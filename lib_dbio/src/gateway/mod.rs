//! # Gateway Module
//!
//! The realtime half of the library: per-identifier WebSocket connections
//! speaking the gateway's legacy framing, coordinated by a fleet manager
//! that demultiplexes their events onto the client's event bus.
//!
//! ## Components:
//!
//! - **`socket`**: the per-connection protocol state machine: connect /
//!   close lifecycle, framing, liveness probes, auto-reconnect.
//! - **`manager`**: the fleet coordinator: one socket per subscription,
//!   the shared heartbeat cycle, event demultiplexing and cache merging.
//! - **`constants`**: wire-level constants (endpoint, opcodes, close
//!   codes, event names).
//! - **`framing`** (crate-private): parser/encoder for the digit-prefixed
//!   frame format.

/// Wire-level constants for the realtime gateway.
pub mod constants;
pub(crate) mod framing;
/// The fleet coordinator.
pub mod manager;
/// The per-connection protocol state machine.
pub mod socket;

// --- Public API Re-exports ---
pub use manager::{SocketManager, SocketManagerOptions, SubscribeOptions};
pub use socket::{ReconnectPolicy, Socket, SocketOptions, SocketState, WebhookOptions};
