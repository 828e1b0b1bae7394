//! Service configuration, sourced from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use timeline_core::{KeySource, GOOGLE_CERTS_URL};
use timeline_storage::{FirestoreConfig, FirestoreCredentials};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_AUDIENCE: &str = "example.com";
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which document store backs the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local; contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Storage project; required for the Firestore backend.
    pub project_id: Option<String>,
    /// Token subject allowed to push deliveries.
    pub admin_uid: String,
    pub token_audience: String,
    pub store: StoreBackend,
    pub firestore_emulator_host: Option<String>,
    pub firestore_access_token: Option<String>,
    pub jwks_url: String,
    /// Local key set; takes precedence over `jwks_url` when set.
    pub jwks_file: Option<PathBuf>,
    pub write_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let store = match get("TIMELINE_STORE").as_deref() {
            None | Some("firestore") => StoreBackend::Firestore,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "TIMELINE_STORE",
                    reason: format!("expected 'firestore' or 'memory', got '{}'", other),
                })
            }
        };

        let project_id = get("PROJECT_ID");
        if store == StoreBackend::Firestore && project_id.is_none() {
            return Err(ConfigError::Missing("PROJECT_ID"));
        }

        let admin_uid = get("ADMIN_UID").ok_or(ConfigError::Missing("ADMIN_UID"))?;

        let write_timeout = parse_millis(
            get("TIMELINE_WRITE_TIMEOUT_MS"),
            "TIMELINE_WRITE_TIMEOUT_MS",
            DEFAULT_WRITE_TIMEOUT_MS,
        )?;
        let request_timeout = parse_millis(
            get("TIMELINE_REQUEST_TIMEOUT_MS"),
            "TIMELINE_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        // The write must be able to fail on its own before the request does.
        if request_timeout <= write_timeout {
            return Err(ConfigError::Invalid {
                key: "TIMELINE_REQUEST_TIMEOUT_MS",
                reason: format!(
                    "must exceed TIMELINE_WRITE_TIMEOUT_MS ({}ms)",
                    write_timeout.as_millis()
                ),
            });
        }

        Ok(Self {
            port,
            project_id,
            admin_uid,
            token_audience: get("TOKEN_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            store,
            firestore_emulator_host: get("FIRESTORE_EMULATOR_HOST"),
            firestore_access_token: get("FIRESTORE_ACCESS_TOKEN"),
            jwks_url: get("TIMELINE_JWKS_URL").unwrap_or_else(|| GOOGLE_CERTS_URL.to_string()),
            jwks_file: get("TIMELINE_JWKS_FILE").map(PathBuf::from),
            write_timeout,
            request_timeout,
        })
    }

    pub fn key_source(&self) -> KeySource {
        match &self.jwks_file {
            Some(path) => KeySource::File(path.clone()),
            None => KeySource::Url(self.jwks_url.clone()),
        }
    }

    /// Firestore settings; emulator host wins over an access token, which
    /// wins over the metadata server.
    pub fn firestore(&self) -> Result<FirestoreConfig, ConfigError> {
        let project_id = self
            .project_id
            .clone()
            .ok_or(ConfigError::Missing("PROJECT_ID"))?;
        let mut config = match &self.firestore_emulator_host {
            Some(host) => FirestoreConfig::emulator(project_id, host),
            None => FirestoreConfig::production(project_id),
        };
        if config.credentials != FirestoreCredentials::Emulator {
            if let Some(token) = &self.firestore_access_token {
                config.credentials = FirestoreCredentials::AccessToken(token.clone());
            }
        }
        config.request_timeout = self.write_timeout;
        Ok(config)
    }
}

fn parse_millis(
    raw: Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let millis = match raw {
        Some(value) => value.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
        None => default,
    };
    if millis == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}
