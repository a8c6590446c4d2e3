//! Real-time message delivery engine.
//!
//! Three pieces cooperate to move chat frames to connected clients:
//!
//! - [`hub`]: a single-owner registry of live connections, driven by a
//!   command channel instead of shared locks. One connection per user;
//!   reconnects evict the previous connection.
//! - [`connection`]: the per-socket actor. A read loop enforcing an idle
//!   deadline and a write loop draining a bounded outbound queue while
//!   keeping the peer alive with pings.
//! - [`event`]: the typed wire envelope pushed over live connections.
//!
//! Persistence and HTTP concerns live in the server crate; this crate
//! only knows about sockets, queues, and frames.

pub mod connection;
pub mod error;
pub mod event;
pub mod hub;

pub use connection::{ConnectionActor, HeartbeatConfig, MAX_FRAME_SIZE};
pub use error::RealtimeError;
pub use event::{EventKind, SocketEvent};
pub use hub::{ConnectionId, Hub, HubHandle, SendOutcome};
