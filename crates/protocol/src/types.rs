use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finalized deployment.
///
/// Immutable once created by the server. `host` is the identifier used to
/// scope the build log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub uid: String,
    pub host: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}
