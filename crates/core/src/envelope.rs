//! Push-delivery envelope decoding.
//!
//! Wire shape:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "<base64 JSON activity>",
//!     "attributes": {"uid": "u42"},
//!     "messageId": "1234"
//!   },
//!   "subscription": "projects/p/subscriptions/timeline-writer"
//! }
//! ```

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use timeline_storage::{validate_segment, Document, DocumentPath};

use crate::error::IngestError;

/// Message attribute naming the user whose timeline receives the activity.
pub const ROUTING_ATTRIBUTE: &str = "uid";

/// Payload field promoted to the document ID.
pub const ACTIVITY_ID_FIELD: &str = "ID";

#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded payload bytes.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub publish_time: Option<String>,
}

impl PushEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(body).map_err(|e| IngestError::MalformedEnvelope(e.to_string()))
    }
}

/// A decoded delivery, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDelivery {
    pub uid: String,
    pub activity_id: String,
    /// `users/{uid}/timeline/{activity_id}`
    pub path: DocumentPath,
    /// The activity payload minus its `ID` field.
    pub record: Document,
    pub message_id: Option<String>,
    /// Subscription that pushed the message, when the envelope names one.
    pub subscription: Option<String>,
    pub publish_time: Option<String>,
}

impl ActivityDelivery {
    pub fn from_envelope(envelope: PushEnvelope) -> Result<Self, IngestError> {
        let PushMessage {
            data,
            attributes,
            message_id,
            publish_time,
        } = envelope.message;

        let data = data
            .ok_or_else(|| IngestError::MalformedPayload("message has no data".to_string()))?;
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| IngestError::MalformedPayload(format!("data is not base64: {}", e)))?;
        let payload: Value = serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::MalformedPayload(format!("data is not JSON: {}", e)))?;
        let Value::Object(mut record) = payload else {
            return Err(IngestError::MalformedPayload(
                "data must decode to a JSON object".to_string(),
            ));
        };

        let uid = attributes
            .and_then(|mut attrs| attrs.remove(ROUTING_ATTRIBUTE))
            .ok_or_else(|| {
                IngestError::MissingRoutingKey(format!(
                    "message has no '{}' attribute",
                    ROUTING_ATTRIBUTE
                ))
            })?;
        validate_segment(&uid).map_err(|e| IngestError::MissingRoutingKey(e.to_string()))?;

        let activity_id = match record.remove(ACTIVITY_ID_FIELD) {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(IngestError::MissingActivityId(format!(
                    "'{}' must be a string, got {}",
                    ACTIVITY_ID_FIELD,
                    json_kind(&other)
                )))
            }
            None => {
                return Err(IngestError::MissingActivityId(format!(
                    "payload has no '{}' field",
                    ACTIVITY_ID_FIELD
                )))
            }
        };
        validate_segment(&activity_id)
            .map_err(|e| IngestError::MissingActivityId(e.to_string()))?;

        let path = DocumentPath::timeline_entry(&uid, &activity_id)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;

        Ok(Self {
            uid,
            activity_id,
            path,
            record,
            message_id,
            subscription: envelope.subscription,
            publish_time,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
