use thiserror::Error;

/// Outcome of a failed call to an external collaborator.
///
/// Collaborators return these variants instead of panicking or logging and
/// swallowing; the orchestrator decides per variant whether the run degrades
/// (enrichment miss, vector-less restaurant) or records an error and skips
/// the item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    /// The collaborator is not configured (missing API key, disabled provider).
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The response arrived but could not be understood.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl CollaboratorError {
    /// Whether this error means "not configured" rather than "broken".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CollaboratorError::Unavailable(_))
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Parse(err.to_string())
    }
}
