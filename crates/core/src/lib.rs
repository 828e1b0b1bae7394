//! timeline-core: the push-delivery writer for per-user activity timelines.
//!
//! Two stages run per delivery:
//!
//! - [`PushAuthenticator`] -- checks the bearer identity token the push
//!   infrastructure attaches (signature, audience, issuer, subject)
//! - [`TimelineWriter`] -- decodes the envelope, derives
//!   `users/{uid}/timeline/{activity_id}`, and upserts the record
//!
//! Both stages return typed errors ([`AuthError`], [`IngestError`]) that the
//! HTTP boundary maps onto status codes.

pub mod auth;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod jwks;

pub use auth::{bearer_token, PushAuthenticator, TokenVerifier, VerifiedClaims, ACCEPTED_ISSUERS};
pub use envelope::{ActivityDelivery, PushEnvelope, PushMessage, ACTIVITY_ID_FIELD, ROUTING_ATTRIBUTE};
pub use error::{AuthError, IngestError};
pub use ingest::{TimelineWriter, WriteReceipt, DEFAULT_WRITE_TIMEOUT};
pub use jwks::{JwksVerifier, KeySource, GOOGLE_CERTS_URL};
