//! Error types for dispatched requests.
//!
//! Every failure a caller can observe is a variant of [`Error`]. Transport
//! failures, malformed envelopes, business errors and expired sessions all
//! flow through the same type, and [`Error::kind`] classifies them for
//! exhaustive matching.

use http::{HeaderMap, StatusCode};

/// The main error type for dispatched requests.
///
/// # Examples
///
/// ```
/// use stashline::{Error, ErrorKind};
///
/// let err = Error::Business {
///     code: 1002,
///     message: Some("Nickname already taken".to_string()),
/// };
///
/// match err.kind() {
///     ErrorKind::Business => assert_eq!(err.code(), Some(1002)),
///     other => panic!("unexpected kind {:?}", other),
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, timeout, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-2xx HTTP status code.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: Box<HeaderMap>,
    },

    /// A custom transport reported a failure of its own.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body does not satisfy the envelope contract, or the
    /// payload could not be decoded into the requested type.
    #[error("Failed to decode response: {reason}")]
    EnvelopeDecode {
        /// The raw response body that failed to decode
        raw_response: String,
        /// What went wrong
        reason: String,
    },

    /// The envelope was parsed, but its code is not the success code.
    #[error("Business error {code}: {}", message.as_deref().unwrap_or("<no message>"))]
    Business {
        /// The envelope code
        code: i64,
        /// The envelope message, if present
        message: Option<String>,
    },

    /// The envelope carried the session-expired code.
    ///
    /// This is a business error that additionally forces a logout.
    #[error("Session expired (code {code}): {}", message.as_deref().unwrap_or("<no message>"))]
    SessionExpired {
        /// The envelope code
        code: i64,
        /// The envelope message, if present
        message: Option<String>,
    },

    /// The key-value store failed. Never surfaced by the response cache,
    /// which treats store failures as misses.
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity failures, non-2xx statuses and custom transport errors.
    Transport,
    /// Response bytes that are not a valid envelope or payload.
    EnvelopeDecode,
    /// An envelope with a non-success code.
    Business,
    /// An envelope with the session-expired code.
    SessionExpired,
    /// Store, configuration and URL errors.
    Local,
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::HttpError { .. } | Error::Transport(_) => {
                ErrorKind::Transport
            }
            Error::EnvelopeDecode { .. } => ErrorKind::EnvelopeDecode,
            Error::Business { .. } => ErrorKind::Business,
            Error::SessionExpired { .. } => ErrorKind::SessionExpired,
            Error::Store(_) | Error::ConfigurationError(_) | Error::InvalidUrl(_) => {
                ErrorKind::Local
            }
        }
    }

    /// Returns `true` for business errors, including expired sessions.
    pub fn is_business(&self) -> bool {
        matches!(self, Error::Business { .. } | Error::SessionExpired { .. })
    }

    /// Returns `true` if this error must force the user to log out.
    ///
    /// That is the case for the session-expired envelope code and for a
    /// `401 Unauthorized` HTTP status.
    ///
    /// # Examples
    ///
    /// ```
    /// use stashline::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::UNAUTHORIZED,
    ///     raw_response: String::new(),
    ///     headers: Box::default(),
    /// };
    /// assert!(err.requires_logout());
    ///
    /// let err = Error::Business { code: 7, message: None };
    /// assert!(!err.requires_logout());
    /// ```
    pub fn requires_logout(&self) -> bool {
        match self {
            Error::SessionExpired { .. } => true,
            Error::HttpError { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }

    /// Returns the envelope code for business errors.
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::Business { code, .. } | Error::SessionExpired { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the server-provided message for business errors.
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Business { message, .. } | Error::SessionExpired { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::EnvelopeDecode { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for dispatched requests.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_covers_taxonomy() {
        let http = Error::HttpError {
            status: StatusCode::BAD_GATEWAY,
            raw_response: "bad gateway".to_string(),
            headers: Box::default(),
        };
        assert_eq!(http.kind(), ErrorKind::Transport);
        assert_eq!(http.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(http.raw_response(), Some("bad gateway"));

        let decode = Error::EnvelopeDecode {
            raw_response: "<html>".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(decode.kind(), ErrorKind::EnvelopeDecode);
        assert!(!decode.is_business());

        let expired = Error::SessionExpired {
            code: 401,
            message: None,
        };
        assert_eq!(expired.kind(), ErrorKind::SessionExpired);
        assert!(expired.is_business());
        assert!(expired.requires_logout());
        assert_eq!(expired.code(), Some(401));
    }

    #[test]
    fn test_business_message() {
        let err = Error::Business {
            code: 3,
            message: Some("Out of stock".to_string()),
        };
        assert_eq!(err.message(), Some("Out of stock"));
        assert_eq!(err.to_string(), "Business error 3: Out of stock");
        assert!(!err.requires_logout());
    }
}
