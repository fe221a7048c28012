//! Session and user-feedback collaborators.
//!
//! Both are injected into the dispatcher at build time. A missing feedback
//! sink simply means nothing is shown.

use serde::{Deserialize, Serialize};

/// The app's session.
pub trait Session: Send + Sync {
    /// The bearer token for authenticated requests, if signed in.
    fn token(&self) -> Option<String> {
        None
    }

    /// Called once per response that signals the session is no longer
    /// valid. The app is expected to sign the user out.
    fn on_forced_logout(&self);
}

/// Fire-and-forget user feedback, called on the main context.
///
/// Every method defaults to doing nothing.
pub trait FeedbackSink: Send + Sync {
    /// A network request started.
    fn loading_started(&self) {}

    /// A network request finished, successfully or not.
    fn loading_finished(&self) {}

    /// Show a success message.
    fn show_success(&self, _message: &str) {}

    /// Show a failure message.
    fn show_failure(&self, _message: &str) {}

    /// The user has to sign in again.
    fn logout_required(&self) {}
}

/// User-visible fallback messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Shown for connectivity failures and business errors without a message.
    pub network: String,
    /// Shown for 5xx responses.
    pub server: String,
    /// Shown for 401 responses.
    pub unauthorized: String,
    /// Shown when a response cannot be decoded.
    pub serialization: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            network: "Network error, please try again".to_string(),
            server: "Server error, please try again later".to_string(),
            unauthorized: "Your session has expired, please sign in again".to_string(),
            serialization: "Unexpected response from server".to_string(),
        }
    }
}

impl Messages {
    /// The message to show for `error`.
    ///
    /// Business errors show the server's message when it has one.
    pub fn for_error(&self, error: &crate::Error) -> String {
        use crate::Error;

        match error {
            Error::Business { message, .. } => {
                message.clone().unwrap_or_else(|| self.network.clone())
            }
            Error::SessionExpired { message, .. } => {
                message.clone().unwrap_or_else(|| self.unauthorized.clone())
            }
            Error::HttpError { status, .. } if status.is_server_error() => self.server.clone(),
            Error::HttpError { status, .. } if status.as_u16() == 401 => self.unauthorized.clone(),
            Error::EnvelopeDecode { .. } => self.serialization.clone(),
            Error::Network(_)
            | Error::HttpError { .. }
            | Error::Transport(_)
            | Error::Store(_)
            | Error::ConfigurationError(_)
            | Error::InvalidUrl(_) => self.network.clone(),
        }
    }
}
