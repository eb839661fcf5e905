//! Error taxonomy shared by every stage of the resolution pipeline.

use thiserror::Error;

/// Errors that can occur while resolving a hash.
///
/// Validator and HTTP errors travel unmodified from the query operations up to
/// the task continuation. A user declining an ambiguity prompt is not an error
/// and never shows up here.
#[derive(Debug, Error)]
pub enum HashDbError {
    /// The request did not complete within the configured timeout.
    #[error("timed out when executing a request: {url}")]
    Timeout { url: String },

    /// The server answered with a non-OK status code.
    #[error("unexpected response code {status} from: {url}")]
    ResponseCode { url: String, status: u16 },

    /// The response body was not valid JSON, or not shaped like a response object.
    #[error("invalid response body from {url}: {message}")]
    Json { url: String, message: String },

    /// Connection-level failure that is not a timeout (DNS, refused, TLS).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// An algorithm record carried a type tag we cannot size.
    #[error("unknown algorithm type: {tag}")]
    UnknownAlgorithmType { tag: String },

    /// An algorithm record was missing a required field.
    #[error("invalid algorithm object: {0}")]
    InvalidAlgorithm(String),

    /// A hash record was malformed.
    #[error("invalid hash object: {0}")]
    InvalidHash(String),

    /// A hunt hit record was malformed.
    #[error("invalid hit object: {0}")]
    InvalidHit(String),

    /// Settings failed validation or could not be parsed.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A call into the host collaborator failed.
    #[error("host operation failed: {0}")]
    HostOperationFailed(String),

    /// The target of a background task panicked.
    #[error("background task panicked: {message}")]
    TaskPanicked { message: String },
}

impl HashDbError {
    /// Whether the failure came from the transport rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HashDbError::Timeout { .. }
                | HashDbError::ResponseCode { .. }
                | HashDbError::Transport { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HashDbError>;
