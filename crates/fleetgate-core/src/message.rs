//! Queue message formats.
//!
//! The worker tier speaks camelCase JSON: requests carry the payload as
//! base64 under `imageData`, responses carry the result under `prediction`.
//! Both are keyed by `fileName`, the identifier the gateway correlates on.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Outbound message published to the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub file_name: String,
    pub image_data: String,
}

impl RequestMessage {
    pub fn new(identifier: &str, payload: &[u8]) -> Self {
        Self {
            file_name: identifier.to_string(),
            image_data: STANDARD.encode(payload),
        }
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.image_data)
    }
}

/// Inbound message read from the response queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub file_name: String,
    pub prediction: String,
}

/// Derive a request identifier from an uploaded file name.
///
/// Directory components and the last extension are dropped:
/// `uploads/cat1.jpg` → `cat1`, `a.b.png` → `a.b`. Returns `None` when
/// nothing is left.
pub fn derive_identifier(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name.trim()).file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
