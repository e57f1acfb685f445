/*!
Error types for the SaveSync core engine.
*/

use thiserror::Error;

/// Result type used throughout the SaveSync core.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during save export and import.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Failures reported by the remote snippet-storage backend
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Opaque failure surfaced by a local save store or handler
    #[error("Local adapter error: {0}")]
    LocalAdapter(String),

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SyncError {
    /// Create a new local adapter error
    pub fn local_adapter<S: Into<String>>(msg: S) -> Self {
        Self::LocalAdapter(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Borrow the remote error, if this is one
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors returned by the remote persistence client.
///
/// The backend carries no structured error body, so every non-success
/// response maps to [`RemoteError::RequestFailed`] and callers tell
/// authentication failures apart by status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Non-success HTTP status, or no response at all (`status` is `None`)
    #[error("{}", request_failed_message(*status, detail))]
    RequestFailed { status: Option<u16>, detail: String },

    /// The remote object exists but does not contain the save file
    #[error("No save file '{file}' in remote object")]
    NotFound { file: String },

    /// The save file content (or response body) is not what we expect
    #[error("Malformed remote payload: {0}")]
    MalformedPayload(String),
}

fn request_failed_message(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("Request failed with HTTP {code}: {detail}"),
        None => format!("Request failed: {detail}"),
    }
}

impl RemoteError {
    /// Create a request failure for a non-success status
    pub fn status<S: Into<String>>(status: u16, detail: S) -> Self {
        Self::RequestFailed {
            status: Some(status),
            detail: detail.into(),
        }
    }

    /// Create a request failure that never produced a response
    pub fn transport<S: Into<String>>(detail: S) -> Self {
        Self::RequestFailed {
            status: None,
            detail: detail.into(),
        }
    }

    /// Create a new malformed payload error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedPayload(msg.into())
    }

    /// HTTP status of a failed request, if the backend answered
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the backend refused the token (401 or 403)
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self.http_status(), Some(401 | 403))
    }
}
