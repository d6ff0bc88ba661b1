//! Deployment synchronization engine.
//!
//! Owns the pipeline between a local project tree and a live deployment:
//! negotiate which content the remote lacks, upload exactly that content
//! in chunks over one multiplexed connection, then finalize the
//! deployment. The transport is abstracted behind [`RemoteConnection`] so
//! the engine never opens sockets itself.

mod error;
mod finalize;
mod negotiate;
mod remote;
mod scheduler;
mod session;
#[cfg(test)]
mod testing;
mod types;

pub use error::SyncError;
pub use remote::{RemoteConnection, RemoteFuture};
pub use session::SyncSession;
pub use types::{PendingSet, SyncEvent, SyncOptions, SyncOutcome, TaskState, TransferTask};
