//! Application state shared across request handlers.

use timeline_core::{PushAuthenticator, TimelineWriter};

pub(crate) struct AppState {
    /// Verifies the push identity token before any body is read.
    pub(crate) authenticator: PushAuthenticator,
    pub(crate) writer: TimelineWriter,
}
