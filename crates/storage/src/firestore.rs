//! Firestore REST v1 backend.
//!
//! Writes go through `PATCH .../documents/{path}` with no update mask, which
//! Firestore treats as a full-document replace. JSON values are mapped onto
//! Firestore's typed value representation on the way in and back out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::path::{Document, DocumentPath};
use crate::traits::DocumentStore;

const PRODUCTION_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh a cached access token this long before it actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// How the store authenticates against Firestore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirestoreCredentials {
    /// Local emulator: no OAuth, the emulator accepts the `owner` token.
    Emulator,
    /// A pre-issued OAuth access token.
    AccessToken(String),
    /// Fetch tokens for the default service account from the GCE / Cloud Run
    /// metadata server.
    MetadataServer,
}

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub base_url: String,
    pub credentials: FirestoreCredentials,
    /// Upper bound for a single HTTP exchange with Firestore.
    pub request_timeout: Duration,
    /// Where `MetadataServer` credentials fetch access tokens.
    pub metadata_token_url: String,
}

impl FirestoreConfig {
    pub fn production(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: "(default)".to_string(),
            base_url: PRODUCTION_BASE_URL.to_string(),
            credentials: FirestoreCredentials::MetadataServer,
            request_timeout: Duration::from_secs(10),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
        }
    }

    /// Target an emulator listening on `host` (e.g. `localhost:8081`).
    pub fn emulator(project_id: impl Into<String>, host: &str) -> Self {
        Self {
            base_url: format!("http://{}/v1", host.trim_end_matches('/')),
            credentials: FirestoreCredentials::Emulator,
            ..Self::production(project_id)
        }
    }

    fn document_url(&self, path: &DocumentPath) -> String {
        let encoded: Vec<String> = path.segments().iter().map(|s| urlencoded(s)).collect();
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database,
            encoded.join("/")
        )
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct FirestoreStore {
    config: FirestoreConfig,
    agent: ureq::Agent,
    token: Mutex<Option<CachedToken>>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            config,
            agent,
            token: Mutex::new(None),
        }
    }

    /// Value for the `Authorization` header.
    async fn authorization(&self) -> Result<String, StorageError> {
        match &self.config.credentials {
            FirestoreCredentials::Emulator => Ok("Bearer owner".to_string()),
            FirestoreCredentials::AccessToken(token) => Ok(format!("Bearer {}", token)),
            FirestoreCredentials::MetadataServer => {
                let mut cached = self.token.lock().await;
                if let Some(c) = cached.as_ref() {
                    if Instant::now() + TOKEN_REFRESH_MARGIN < c.expires_at {
                        return Ok(format!("Bearer {}", c.token));
                    }
                }
                let fresh = self.fetch_metadata_token().await?;
                let header = format!("Bearer {}", fresh.token);
                *cached = Some(fresh);
                Ok(header)
            }
        }
    }

    async fn fetch_metadata_token(&self) -> Result<CachedToken, StorageError> {
        let agent = self.agent.clone();
        let url = self.config.metadata_token_url.clone();
        let response = tokio::task::spawn_blocking(move || {
            let mut response = agent
                .get(&url)
                .header("Metadata-Flavor", "Google")
                .call()
                .map_err(|e| StorageError::Unavailable(format!("metadata server: {}", e)))?;
            let status = response.status().as_u16();
            if status != 200 {
                return Err(StorageError::Unavailable(format!(
                    "metadata server returned {}",
                    status
                )));
            }
            response
                .body_mut()
                .read_json::<MetadataTokenResponse>()
                .map_err(|e| StorageError::Backend(format!("metadata token response: {}", e)))
        })
        .await
        .map_err(|e| StorageError::Backend(format!("task join error: {}", e)))??;

        tracing::debug!(expires_in = response.expires_in, "refreshed firestore access token");
        Ok(CachedToken {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        })
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn set(&self, path: &DocumentPath, document: Document) -> Result<(), StorageError> {
        let url = self.config.document_url(path);
        let body = encode_document(&document).map_err(|message| StorageError::Rejected {
            path: path.to_string(),
            message,
        })?;
        let authorization = self.authorization().await?;
        let agent = self.agent.clone();
        let path_str = path.to_string();

        let (status, text) = tokio::task::spawn_blocking(move || {
            let response = agent
                .patch(&url)
                .header("Authorization", &authorization)
                .send_json(&body)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            read_status_and_text(response)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("task join error: {}", e)))??;

        if status == 401 {
            self.forget_token().await;
        }
        classify_status(status, &path_str, text)
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError> {
        let url = self.config.document_url(path);
        let authorization = self.authorization().await?;
        let agent = self.agent.clone();
        let path_str = path.to_string();

        let (status, text) = tokio::task::spawn_blocking(move || {
            let response = agent
                .get(&url)
                .header("Authorization", &authorization)
                .call()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            read_status_and_text(response)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("task join error: {}", e)))??;

        if status == 404 {
            return Ok(None);
        }
        if status == 401 {
            self.forget_token().await;
        }
        classify_status(status, &path_str, text.clone())?;

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| StorageError::Backend(format!("invalid document JSON: {}", e)))?;
        Ok(Some(decode_document(&parsed)))
    }

    fn backend_name(&self) -> &str {
        "firestore"
    }
}

fn read_status_and_text(
    response: ureq::http::Response<ureq::Body>,
) -> Result<(u16, String), StorageError> {
    let status = response.status().as_u16();
    let text = response
        .into_body()
        .read_to_string()
        .map_err(|e| StorageError::Unavailable(format!("reading response body: {}", e)))?;
    Ok((status, text))
}

/// Map a Firestore HTTP status onto the storage error taxonomy.
fn classify_status(status: u16, path: &str, body: String) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        401 | 408 | 429 | 500..=599 => Err(StorageError::Unavailable(format!(
            "firestore returned {} for {}",
            status, path
        ))),
        _ => Err(StorageError::Rejected {
            path: path.to_string(),
            message: format!("HTTP {}: {}", status, body.trim()),
        }),
    }
}

/// Encode a document as a Firestore write body: `{"fields": {...}}`.
pub fn encode_document(document: &Document) -> Result<Value, String> {
    Ok(json!({ "fields": encode_fields(document)? }))
}

fn encode_fields(
    map: &serde_json::Map<String, Value>,
) -> Result<serde_json::Map<String, Value>, String> {
    map.iter()
        .map(|(k, v)| encode_value(v).map(|encoded| (k.clone(), encoded)))
        .collect()
}

/// Encode a single JSON value as a Firestore typed value.
///
/// Fails for unsigned integers above `i64::MAX`: Firestore integers are
/// int64, and storing them as doubles would silently lose precision.
pub fn encode_value(value: &Value) -> Result<Value, String> {
    let encoded = match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            // int64 travels as a decimal string
            (Some(i), _) => json!({ "integerValue": i.to_string() }),
            (None, Some(u)) => return Err(format!("integer {} exceeds the int64 range", u)),
            (None, None) => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values = items
                .iter()
                .map(encode_value)
                .collect::<Result<Vec<Value>, String>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map)? } }),
    };
    Ok(encoded)
}

fn decode_document(body: &Value) -> Document {
    body.get("fields")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(b) = obj.get("booleanValue") {
        return b.clone();
    }
    if let Some(i) = obj.get("integerValue") {
        return i
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| i.clone());
    }
    if let Some(d) = obj.get("doubleValue") {
        return d.clone();
    }
    for key in ["stringValue", "timestampValue", "referenceValue", "bytesValue"] {
        if let Some(s) = obj.get(key) {
            return s.clone();
        }
    }
    if let Some(array) = obj.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = obj.get("mapValue") {
        return Value::Object(decode_document(map));
    }
    if let Some(geo) = obj.get("geoPointValue") {
        return geo.clone();
    }
    Value::Null
}

/// Percent-encode a path segment for use in a URL path.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
