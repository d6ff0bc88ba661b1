use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Client configuration: where the platform lives and how to prove who
/// we are.
///
/// Loaded from `~/.config/stratus/config.json`; the `STRATUS_SERVER_URL`
/// and `STRATUS_TOKEN` environment variables override the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// WebSocket base URL, e.g. `wss://api.stratus.dev`.
    #[serde(default)]
    pub server_url: String,
    /// Bearer token for the session handshake.
    #[serde(default)]
    pub token: String,
}

impl ClientConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();
        let mut config = match &path {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("STRATUS_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(token) = std::env::var("STRATUS_TOKEN") {
            config.token = token;
        }

        anyhow::ensure!(
            !config.server_url.is_empty(),
            "no server URL configured; set serverUrl in {} or STRATUS_SERVER_URL",
            describe_path(&path)
        );
        anyhow::ensure!(
            !config.token.is_empty(),
            "no token configured; set token in {} or STRATUS_TOKEN",
            describe_path(&path)
        );

        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// URL of the deployment session endpoint.
    pub fn session_url(&self) -> String {
        format!("{}/session", self.server_url.trim_end_matches('/'))
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("stratus").join("config.json"))
}

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "~/.config/stratus/config.json".into(),
    }
}
