//! RS256 identity-token verification against a JSON Web Key Set.
//!
//! The default key source is Google's OAuth2 certificate endpoint, which is
//! what push subscriptions with an attached service account sign against.
//! Fetched keys are cached for the lifetime the endpoint advertises via
//! `Cache-Control: max-age`. A token naming an unknown `kid` triggers a
//! refetch so key rotation is picked up without waiting for expiry, but at
//! most once a minute; concurrent misses share a single download.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::auth::{TokenVerifier, VerifiedClaims};
use crate::error::AuthError;

pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Cache lifetime when the key endpoint sends no usable `max-age`.
const DEFAULT_KEY_MAX_AGE: Duration = Duration::from_secs(3600);

/// Allowed clock skew for `exp` / `nbf`, in seconds.
const LEEWAY_SECS: u64 = 60;

/// Unknown `kid`s never cause more than one key download per interval.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Where verification keys come from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Fetch a JWKS document over HTTPS.
    Url(String),
    /// Read a JWKS document from disk once.
    File(PathBuf),
    /// A fixed key set.
    Static(JwkSet),
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    max_age: Duration,
}

impl CachedKeys {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.max_age
    }

    fn recently_fetched(&self) -> bool {
        self.fetched_at.elapsed() < MIN_REFRESH_INTERVAL
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    sub: String,
    aud: Audience,
    exp: u64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

pub struct JwksVerifier {
    source: KeySource,
    agent: ureq::Agent,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(source: KeySource) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .build()
            .into();
        Self {
            source,
            agent,
            cache: RwLock::new(None),
        }
    }

    /// Find the decoding key for `kid`.
    ///
    /// A miss on a fresh key set refetches only when the last download is
    /// older than `MIN_REFRESH_INTERVAL`. The write lock is held across the
    /// download, so concurrent misses wait for it and then reuse its result.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                if let Some(jwk) = cached.keys.find(kid) {
                    return decoding_key(jwk);
                }
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            if let Some(jwk) = cached.keys.find(kid) {
                return decoding_key(jwk);
            }
            if cached.recently_fetched() {
                return Err(unknown_kid(kid));
            }
        }

        let fresh = self.load_keys().await?;
        let key = fresh.keys.find(kid).map(decoding_key);
        *cache = Some(fresh);

        key.unwrap_or_else(|| Err(unknown_kid(kid)))
    }

    async fn load_keys(&self) -> Result<CachedKeys, AuthError> {
        match &self.source {
            KeySource::Static(keys) => Ok(CachedKeys {
                keys: keys.clone(),
                fetched_at: Instant::now(),
                max_age: Duration::MAX,
            }),
            KeySource::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AuthError::TokenInvalid(format!(
                        "cannot read key set '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                let keys: JwkSet = serde_json::from_str(&raw).map_err(|e| {
                    AuthError::TokenInvalid(format!(
                        "invalid key set '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(CachedKeys {
                    keys,
                    fetched_at: Instant::now(),
                    max_age: Duration::MAX,
                })
            }
            KeySource::Url(url) => {
                let agent = self.agent.clone();
                let url = url.clone();
                let (keys, max_age) = tokio::task::spawn_blocking(move || {
                    let mut response = agent.get(&url).call().map_err(|e| {
                        AuthError::TokenInvalid(format!("fetching signing keys: {}", e))
                    })?;
                    let max_age = response
                        .headers()
                        .get("cache-control")
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_max_age)
                        .unwrap_or(DEFAULT_KEY_MAX_AGE);
                    let keys = response.body_mut().read_json::<JwkSet>().map_err(|e| {
                        AuthError::TokenInvalid(format!("parsing signing keys: {}", e))
                    })?;
                    Ok::<_, AuthError>((keys, max_age))
                })
                .await
                .map_err(|e| AuthError::TokenInvalid(format!("task join error: {}", e)))??;

                tracing::debug!(
                    keys = keys.keys.len(),
                    max_age_secs = max_age.as_secs(),
                    "refreshed token signing keys"
                );
                Ok(CachedKeys {
                    keys,
                    fetched_at: Instant::now(),
                    max_age,
                })
            }
        }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str, audience: &str) -> Result<VerifiedClaims, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::TokenInvalid(format!("unreadable token header: {}", e)))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::TokenInvalid(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::TokenInvalid("token header has no kid".to_string()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.leeway = LEEWAY_SECS;

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;
        let claims = data.claims;

        let audience = match claims.aud {
            Audience::One(aud) => aud,
            Audience::Many(auds) => auds
                .into_iter()
                .find(|a| a == audience)
                .unwrap_or_else(|| audience.to_string()),
        };

        Ok(VerifiedClaims {
            subject: claims.sub,
            issuer: claims.iss,
            audience,
            email: claims.email,
            email_verified: claims.email_verified,
            expires_at: claims.exp,
        })
    }
}

fn unknown_kid(kid: &str) -> AuthError {
    AuthError::TokenInvalid(format!("no signing key with kid '{}'", kid))
}

fn decoding_key(jwk: &jsonwebtoken::jwk::Jwk) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| AuthError::TokenInvalid(format!("unusable signing key: {}", e)))
}

/// Extract `max-age` from a `Cache-Control` header value.
fn parse_max_age(header: &str) -> Option<Duration> {
    header
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
