//! Error types for the client.
//!
//! Nothing here is fatal to the process. Callers keep their last known good
//! state and surface [`Error::user_message`] where a person is looking.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::Screen;

/// Client error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The auth endpoint answered with a non-2xx status.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Connection refused, DNS failure, TLS failure or timeout.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A background fetch outside the login flow failed.
    #[error("Failed to fetch {resource}: {reason}")]
    SoftFetchFailure {
        /// What was being fetched (profile, workspace, chat, ...).
        resource: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// A single file of an upload batch failed.
    #[error("Upload of {} failed: {reason}", file.display())]
    UploadFailure {
        /// The file that was rejected.
        file: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Input rejected before any request was made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An authorized call was attempted without a session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The navigation state machine has no such edge.
    #[error("Cannot navigate from {from:?} to {to:?}")]
    InvalidTransition {
        /// Screen at the time of the request.
        from: Screen,
        /// Requested target.
        to: Screen,
    },

    /// The host is on the API denylist.
    #[error("Host is denylisted: {0}")]
    DeniedHost(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session store I/O failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Message suitable for showing on the login form or a toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials(detail) if !detail.is_empty() => detail.clone(),
            Self::InvalidCredentials(_) => "Invalid email or password.".to_string(),
            Self::NetworkError(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            Self::NotAuthenticated => "Please sign in to continue.".to_string(),
            Self::UploadFailure { file, reason } => {
                let name = file
                    .file_name()
                    .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into());
                format!("{name}: {reason}")
            }
            other => other.to_string(),
        }
    }

    /// True for failures that never reached a server.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::SoftFetchFailure {
                resource: "response body",
                reason: err.to_string(),
            }
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
