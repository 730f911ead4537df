use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque keyset pagination cursor: URL-safe base64 of canonical JSON. Sort
/// key matches the feed's compound order exactly so the keyset predicate can
/// be built directly off its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "importanceScore")]
    pub importance_score: i64,
    #[serde(rename = "lastSignalAt")]
    pub last_signal_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("invalid cursor encoding")]
    Base64,
    #[error("invalid cursor payload")]
    Json,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor always serializes");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| CursorError::Base64)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cursor = Cursor {
            importance_score: 12429,
            last_signal_at: "2024-06-15T12:00:00Z".parse().unwrap(),
            id: Uuid::new_v4(),
        };
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Cursor::decode("not valid base64!!").is_err());
    }

    #[test]
    fn decode_rejects_valid_base64_wrong_shape() {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"\"just a string\"");
        assert!(Cursor::decode(&encoded).is_err());
    }
}
