use thiserror::Error;

/// Failure outcome of a single upload attempt.
///
/// None of these abort a sync run; they are recorded on the catalog entry and
/// the entry goes back on the queue while it has retries left.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cannot read file: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Transport status code to persist alongside the failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UploadError::HttpStatus { status, .. } => Some(*status),
            UploadError::Http(e) => e.status().map(|s| s.as_u16()),
            UploadError::Io(_) => None,
        }
    }
}
