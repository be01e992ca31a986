//! Error types shared by the transport, transcript store, and session controller.

use thiserror::Error;

/// Failure talking to the question-answering service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service answered but refused the operation (e.g. bad login, unsupported upload).
    #[error("{0}")]
    Remote(String),
}

/// Errors surfaced to callers of the session controller and transcript store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request could not be dispatched or the stream broke mid-flight.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Mutation against a handle issued before the transcript was cleared.
    #[error("invalid transcript handle")]
    InvalidHandle,

    /// Mutation against a message whose exchange has already been finalized.
    #[error("message is finalized and can no longer change")]
    MessageFrozen,

    #[error("nothing to export")]
    EmptyExport,

    /// Another exchange or upload is in flight.
    #[error("an exchange is already in progress")]
    Busy,

    /// A document upload was stopped through the abort handle.
    #[error("upload aborted")]
    Aborted,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("username is required")]
    EmptyUsername,

    /// The service reported an error inside the answer stream.
    #[error("{0}")]
    Remote(String),
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Remote(msg) => SessionError::Remote(msg),
            other => SessionError::TransportUnavailable(other.to_string()),
        }
    }
}

/// A stream line carrying the record marker that could not be parsed.
///
/// Never propagated: the decoder drops the line and hands this to its
/// diagnostic hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record ({reason}): {line}")]
pub struct MalformedRecord {
    pub line: String,
    pub reason: String,
}
