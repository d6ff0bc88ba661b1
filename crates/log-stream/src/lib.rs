//! Live tail of a deployment's build log.
//!
//! Opens a dedicated WebSocket scoped to one deployment host and forwards
//! `log_line` frames in arrival order. The stream never reconnects on its
//! own; a transport failure is terminal and visible as
//! [`StreamState::Errored`].

mod stream;

pub use stream::{LogStream, StreamError, StreamState};
