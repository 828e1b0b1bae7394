//! Delivery authentication: proves a push request came from the push
//! infrastructure's service identity and not from an arbitrary caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;

/// Issuer values Google uses for OIDC identity tokens.
pub const ACCEPTED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Claims of a token whose signature, expiry and audience have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    /// Seconds since the Unix epoch.
    pub expires_at: u64,
}

/// Token verification oracle.
///
/// Implementations check signature, expiry, and audience and return the
/// token's claims. Issuer and subject policy is left to the caller.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str, audience: &str) -> Result<VerifiedClaims, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = header
        .ok_or_else(|| AuthError::MalformedHeader("missing Authorization header".to_string()))?;
    let Some((scheme, token)) = raw.trim().split_once(' ') else {
        return Err(AuthError::MalformedHeader(
            "expected 'Bearer <token>'".to_string(),
        ));
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader(format!(
            "unsupported scheme '{}'",
            scheme
        )));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader("empty bearer token".to_string()));
    }
    Ok(token)
}

/// Gatekeeper for push deliveries.
#[derive(Clone)]
pub struct PushAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
    audience: String,
    admin_subject: String,
}

impl PushAuthenticator {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        audience: impl Into<String>,
        admin_subject: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            audience: audience.into(),
            admin_subject: admin_subject.into(),
        }
    }

    /// Authenticate a delivery from its raw `Authorization` header value.
    ///
    /// Checks run in order: header shape, token verification against the
    /// expected audience, issuer allow-list, administrator subject. The first
    /// failure is returned.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<VerifiedClaims, AuthError> {
        let token = bearer_token(header)?;
        let claims = self.verifier.verify(token, &self.audience).await?;

        if !ACCEPTED_ISSUERS.contains(&claims.issuer.as_str()) {
            return Err(AuthError::WrongIssuer {
                issuer: claims.issuer,
            });
        }

        if claims.subject != self.admin_subject {
            tracing::warn!(
                subject = %claims.subject,
                email = claims.email.as_deref().unwrap_or(""),
                "push token subject is not the administrator"
            );
            return Err(AuthError::NotAdministrator {
                subject: claims.subject,
            });
        }

        Ok(claims)
    }
}
