//! Domain-level error types for intercom-export.
//!
//! All errors are typed with `thiserror` and carry enough context to name
//! the failing conversation id, classification, and attempt count where
//! applicable.

use thiserror::Error;

use super::models::Conversation;

/// Application-level errors covering configuration, parsing, and API failures.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed configuration. Fatal before any network call.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed API payload. Fatal for the affected record; never retried.
    #[error("Failed to parse API payload: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// 4xx response other than 429. Never retried.
    #[error("API request failed with status {status}: {body}")]
    PermanentClient { status: u16, body: String },

    /// A retryable failure that survived all retry attempts.
    #[error("Giving up after {attempts} attempt(s): {classification}")]
    RetryExhausted {
        classification: String,
        attempts: u32,
    },

    /// The API returned no record for a requested conversation id.
    #[error("Conversation {id} not found")]
    NotFound { id: String },

    /// Run deadline expired with fetches still outstanding. Carries the
    /// records fetched before expiry so callers can salvage partial output.
    #[error("Export cancelled by deadline: {} of {total} conversations fetched", .completed.len())]
    Cancelled {
        completed: Vec<Conversation>,
        total: usize,
    },

    /// Transport-level failure from the HTTP stack.
    #[error("HTTP transport error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A per-id failure inside a batch, naming the id that failed.
    #[error("Fetching conversation {id} failed: {source}")]
    Fetch {
        id: String,
        #[source]
        source: Box<AppError>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a parsing error from a message.
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error from a reqwest error.
    pub fn http(err: reqwest::Error) -> Self {
        Self::Http {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Attach the conversation id this error belongs to.
    #[must_use]
    pub fn for_id(self, id: impl Into<String>) -> Self {
        Self::Fetch {
            id: id.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
