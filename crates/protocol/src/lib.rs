pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Message, RemoteError};
pub use messages::{FileEntry, LogLinePayload};
pub use types::Deployment;
