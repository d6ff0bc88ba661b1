fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use stratus_protocol::constants::MessageType;
    use stratus_protocol::envelope::Message;
    use stratus_protocol::messages::{
        AuthRequest, ChunkAckResponse, ChunkUploadHeader, DeployCreateRequest, FileEntry,
        LogLinePayload, ManifestSyncRequest, ManifestSyncResponse,
    };
    use stratus_protocol::types::Deployment;

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture_text(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&load_fixture_text(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Normalizes numbers so `65` and `65.0` compare equal; servers in
    /// other languages serialize integral floats without the fraction.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a typed value, re-serializes it, and
    /// compares the JSON (order-independent, float-normalized).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}"
        );
    }

    /// Envelope variant of [`roundtrip_test`]: the payload is a
    /// `RawValue`, which only deserializes from text, not from a `Value`.
    fn envelope_roundtrip(name: &str) -> Message {
        let text = load_fixture_text(name);
        let parsed: Message = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_string(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        let original: serde_json::Value = serde_json::from_str(&text).unwrap();
        let roundtripped: serde_json::Value = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(
            normalize_value(&original),
            normalize_value(&roundtripped),
            "roundtrip mismatch for {name}"
        );
        parsed
    }

    // --- Flat message payloads ---

    #[test]
    fn fixture_file_entry() {
        roundtrip_test::<FileEntry>("file_entry.json");
    }

    #[test]
    fn fixture_auth_request() {
        roundtrip_test::<AuthRequest>("auth_request.json");
    }

    #[test]
    fn fixture_manifest_sync_request() {
        roundtrip_test::<ManifestSyncRequest>("manifest_sync_request.json");
    }

    #[test]
    fn fixture_manifest_sync_response() {
        roundtrip_test::<ManifestSyncResponse>("manifest_sync_response.json");
    }

    #[test]
    fn fixture_chunk_upload_header() {
        roundtrip_test::<ChunkUploadHeader>("chunk_upload_header.json");
    }

    #[test]
    fn fixture_chunk_ack_response() {
        roundtrip_test::<ChunkAckResponse>("chunk_ack_response.json");
    }

    #[test]
    fn fixture_deploy_create_request() {
        roundtrip_test::<DeployCreateRequest>("deploy_create_request.json");
    }

    #[test]
    fn fixture_deployment() {
        roundtrip_test::<Deployment>("deployment.json");
    }

    #[test]
    fn fixture_log_line() {
        roundtrip_test::<LogLinePayload>("log_line.json");
    }

    // --- Envelopes ---

    #[test]
    fn fixture_message_manifest_sync() {
        let msg = envelope_roundtrip("message_manifest_sync.json");
        assert_eq!(msg.msg_type, MessageType::ManifestSync);
        let payload: ManifestSyncRequest = msg.parse_payload().unwrap().unwrap();
        assert_eq!(payload.files.len(), 2);
        assert_eq!(payload.total_size, 15360);
    }

    #[test]
    fn fixture_message_error() {
        let msg = envelope_roundtrip("message_error.json");
        assert_eq!(msg.msg_type, MessageType::Error);
        let err = msg.error.expect("error field");
        assert_eq!(err.code, 507);
        assert_eq!(err.message, "content store full");
    }

    #[test]
    fn fixture_message_log_line() {
        let msg = envelope_roundtrip("message_log_line.json");
        assert_eq!(msg.msg_type, MessageType::LogLine);
        let line: LogLinePayload = msg.parse_payload().unwrap().unwrap();
        assert_eq!(line.timestamp, 1756215330123);
        assert_eq!(line.text, "installing dependencies");
    }
}
