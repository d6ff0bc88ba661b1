//! Persistent multiplexed WebSocket connection.
//!
//! One connection carries many concurrent request/response exchanges,
//! correlated by UUID. Binary chunk frames share the same socket and the
//! same correlation scheme, so uploads multiplex without extra sockets.

mod client;
pub(crate) mod pumps;

pub use client::{Connection, ConnectionError};
