//! Error taxonomy for the two delivery stages.

/// Why a delivery failed authentication. Every variant is a client error:
/// the delivery is rejected before any storage access.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed Authorization header: {0}")]
    MalformedHeader(String),
    #[error("token verification failed: {0}")]
    TokenInvalid(String),
    #[error("Wrong issuer: {issuer}")]
    WrongIssuer { issuer: String },
    #[error("subject {subject} does not have administrator rights")]
    NotAdministrator { subject: String },
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedHeader(_) => "malformed_header",
            Self::TokenInvalid(_) => "token_invalid",
            Self::WrongIssuer { .. } => "wrong_issuer",
            Self::NotAdministrator { .. } => "not_administrator",
        }
    }
}

/// Why an authenticated delivery could not be stored.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing routing key: {0}")]
    MissingRoutingKey(String),
    #[error("missing activity ID: {0}")]
    MissingActivityId(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl IngestError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::MissingRoutingKey(_) => "missing_routing_key",
            Self::MissingActivityId(_) => "missing_activity_id",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Only storage failures are worth redelivering; a malformed delivery
    /// will fail the same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
