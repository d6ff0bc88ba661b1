//! Test doubles shared by the unit tests in this crate.

use std::sync::Mutex;

use stratus_indexer::Manifest;
use stratus_protocol::constants::MessageType;
use stratus_protocol::envelope::Message;
use stratus_protocol::messages::{
    ChunkAckResponse, DeployCreateResponse, FileEntry, ManifestSyncResponse,
};
use stratus_protocol::types::Deployment;

use crate::error::SyncError;
use crate::remote::{RemoteConnection, RemoteFuture};

pub(crate) fn manifest_from(entries: Vec<FileEntry>) -> Manifest {
    Manifest::from_entries(entries)
}

pub(crate) fn test_deployment() -> Deployment {
    Deployment {
        uid: "dep-0001".into(),
        host: "quiet-meadow-4821".into(),
        url: "https://quiet-meadow-4821.stratus.app".into(),
        created_at: chrono::Utc::now(),
    }
}

/// Scripted remote that records everything sent to it.
pub(crate) struct MockRemote {
    missing: Vec<String>,
    requests: Mutex<Vec<(MessageType, Option<serde_json::Value>)>>,
    binary_headers: Mutex<Vec<serde_json::Value>>,
    fail_checksum: Option<String>,
    hang_binary: bool,
    hang_requests: bool,
    closed: Mutex<u32>,
}

impl MockRemote {
    pub(crate) fn new() -> Self {
        Self {
            missing: Vec::new(),
            requests: Mutex::new(Vec::new()),
            binary_headers: Mutex::new(Vec::new()),
            fail_checksum: None,
            hang_binary: false,
            hang_requests: false,
            closed: Mutex::new(0),
        }
    }

    /// Fingerprints the mock reports as missing during negotiation.
    pub(crate) fn with_missing(mut self, missing: Vec<String>) -> Self {
        self.missing = missing;
        self
    }

    /// Rejects every chunk carrying this file fingerprint.
    pub(crate) fn failing_checksum(mut self, checksum: &str) -> Self {
        self.fail_checksum = Some(checksum.into());
        self
    }

    /// Never acknowledges any binary frame.
    pub(crate) fn hanging_binary(mut self) -> Self {
        self.hang_binary = true;
        self
    }

    /// Never answers any text request.
    pub(crate) fn hanging_requests(mut self) -> Self {
        self.hang_requests = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<(MessageType, Option<serde_json::Value>)> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn binary_headers(&self) -> Vec<serde_json::Value> {
        self.binary_headers.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> u32 {
        *self.closed.lock().unwrap()
    }
}

impl RemoteConnection for MockRemote {
    fn send_request(
        &self,
        msg_type: MessageType,
        payload: Option<serde_json::Value>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap()
                .push((msg_type.clone(), payload));

            if self.hang_requests {
                std::future::pending::<()>().await;
            }

            match msg_type {
                MessageType::ManifestSync => {
                    let resp = ManifestSyncResponse {
                        missing: self.missing.clone(),
                    };
                    Ok(Message::new(
                        "mock",
                        MessageType::ManifestSyncResponse,
                        Some(&resp),
                    )?)
                }
                MessageType::DeployCreate => {
                    let resp = DeployCreateResponse {
                        deployment: test_deployment(),
                    };
                    Ok(Message::new(
                        "mock",
                        MessageType::DeployCreateResponse,
                        Some(&resp),
                    )?)
                }
                other => Err(SyncError::Connection(format!(
                    "mock has no script for {other:?}"
                ))),
            }
        })
    }

    fn send_binary(
        &self,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> RemoteFuture<'_, Result<Message, SyncError>> {
        Box::pin(async move {
            if self.hang_binary {
                std::future::pending::<()>().await;
            }

            let checksum = header["checksum"].as_str().unwrap_or_default().to_string();
            let offset = header["offset"].as_i64().unwrap_or_default();
            self.binary_headers.lock().unwrap().push(header);

            if self.fail_checksum.as_deref() == Some(checksum.as_str()) {
                return Err(SyncError::Connection("remote rejected chunk".into()));
            }

            let ack = ChunkAckResponse {
                checksum,
                offset,
                received: offset + data.len() as i64,
            };
            Ok(Message::new("mock", MessageType::ChunkAck, Some(&ack))?)
        })
    }

    fn close(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            *self.closed.lock().unwrap() += 1;
        })
    }
}
